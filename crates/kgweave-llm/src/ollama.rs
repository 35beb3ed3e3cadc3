//! Ollama LLM provider implementation.

use async_trait::async_trait;

use kgweave_core::error::{KgError, KgResult};
use kgweave_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse};
use kgweave_core::types::Message;

#[cfg(feature = "ollama")]
use kgweave_core::traits::ResponseFormat;
#[cfg(feature = "ollama")]
use kgweave_core::types::MessageRole;
#[cfg(feature = "ollama")]
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    generation::options::GenerationOptions as OllamaOptions,
    generation::parameters::FormatType,
    Ollama,
};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "deepseek-r1:32b";

/// Ollama LLM provider.
pub struct OllamaLlm {
    #[cfg(feature = "ollama")]
    client: Ollama,
    config: LlmConfig,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider.
    pub fn new(config: LlmConfig) -> KgResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let url = url::Url::parse(&base_url)
            .map_err(|e| KgError::Configuration(format!("Invalid Ollama URL: {}", e)))?;

        #[cfg(feature = "ollama")]
        let client = {
            let host = url.host_str().unwrap_or("localhost");
            let port = url.port().unwrap_or(11434);
            Ollama::new(format!("{}://{}", url.scheme(), host), port)
        };
        #[cfg(not(feature = "ollama"))]
        let _ = url;

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            #[cfg(feature = "ollama")]
            client,
            config,
        })
    }

    #[cfg(feature = "ollama")]
    fn message_to_ollama(msg: &Message) -> ChatMessage {
        match msg.role {
            MessageRole::System => ChatMessage::system(msg.content.clone()),
            MessageRole::User => ChatMessage::user(msg.content.clone()),
            MessageRole::Assistant => ChatMessage::assistant(msg.content.clone()),
        }
    }
}

#[async_trait]
impl Llm for OllamaLlm {
    #[cfg(feature = "ollama")]
    async fn generate(
        &self,
        messages: &[Message],
        options: Option<GenerationOptions>,
    ) -> KgResult<LlmResponse> {
        let options = options.unwrap_or_default();

        let ollama_messages: Vec<ChatMessage> =
            messages.iter().map(Self::message_to_ollama).collect();

        let sampling = OllamaOptions::default()
            .temperature(options.temperature.unwrap_or(self.config.temperature))
            .top_p(options.top_p.unwrap_or(self.config.top_p));

        let mut request = ChatMessageRequest::new(self.config.model.clone(), ollama_messages)
            .options(sampling);
        if matches!(options.response_format, Some(ResponseFormat::Json)) {
            request = request.format(FormatType::Json);
        }

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| KgError::llm(format!("Ollama API error: {}", e)))?;

        Ok(response
            .message
            .map(|m| LlmResponse::text(m.content))
            .unwrap_or_default())
    }

    #[cfg(not(feature = "ollama"))]
    async fn generate(
        &self,
        _messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> KgResult<LlmResponse> {
        Err(KgError::Configuration(
            "Ollama feature not enabled. Enable the 'ollama' feature.".to_string(),
        ))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
