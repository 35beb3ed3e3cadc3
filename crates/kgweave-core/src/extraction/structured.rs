//! Structured output from a language model.
//!
//! The [`StructuredExtractor`] trait is the seam between the gateway and
//! whatever produces JSON candidates. [`LlmStructuredExtractor`] prompts an
//! [`Llm`] with the target JSON shape and parses the reply leniently:
//! fenced code blocks are unwrapped and single quotes or trailing commas are
//! repaired before giving up.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::error::{ExtractionKind, KgResult};
use crate::traits::{GenerationOptions, Llm, ResponseFormat};
use crate::types::Message;

/// Target shape of one extraction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSchema {
    Entities,
    Relationships,
}

impl OutputSchema {
    /// Key that must hold the candidate array in a well-formed result.
    pub fn top_level_key(&self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Relationships => "relationships",
        }
    }

    pub fn kind(&self) -> ExtractionKind {
        match self {
            Self::Entities => ExtractionKind::Entities,
            Self::Relationships => ExtractionKind::Relationships,
        }
    }

    fn json_shape(&self) -> &'static str {
        match self {
            Self::Entities => {
                r#"{
  "entities": [
    {"label": "entity type, e.g. gene, protein, disease", "name": "entity name"}
  ]
}"#
            }
            Self::Relationships => {
                r#"{
  "relationships": [
    {
      "startNode": {"label": "entity type", "name": "entity name"},
      "endNode": {"label": "entity type", "name": "entity name"},
      "name": "predicate"
    }
  ]
}"#
            }
        }
    }

    fn rules(&self) -> &'static str {
        match self {
            Self::Entities => {
                "1. Every entity encodes exactly ONE concept\n\
                 2. Names must not be empty\n\
                 3. Use the most specific type that applies\n\
                 4. If no entities are found, return an empty array"
            }
            Self::Relationships => {
                "1. startNode and endNode must come from the provided entities\n\
                 2. The predicate is a single, semantically distinct relation\n\
                 3. Never relate an entity to itself\n\
                 4. If no relationships are found, return an empty array"
            }
        }
    }
}

/// Produces a structured JSON result for a text context.
///
/// Implementations may be called repeatedly with the same arguments.
/// `Ok(None)` means the reply could not be read as JSON at all.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract_structured(
        &self,
        context: &str,
        schema: OutputSchema,
        instructions: &str,
    ) -> KgResult<Option<Value>>;
}

/// [`StructuredExtractor`] backed by an LLM in JSON mode.
pub struct LlmStructuredExtractor {
    llm: Arc<dyn Llm>,
}

impl LlmStructuredExtractor {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self { llm }
    }

    fn system_prompt(schema: OutputSchema) -> String {
        format!(
            r#"You are an experienced knowledge graph builder. Extract {} from the context.

Output JSON in this exact format:
{}

Rules:
{}

Return ONLY valid JSON, no other text."#,
            schema.top_level_key(),
            schema.json_shape(),
            schema.rules()
        )
    }

    fn user_prompt(context: &str, instructions: &str) -> String {
        if instructions.trim().is_empty() {
            format!("# Context\n{}", context)
        } else {
            format!("# Directives\n{}\n\n# Context\n{}", instructions.trim(), context)
        }
    }

    /// Extract JSON from a reply (handles markdown code blocks).
    fn extract_json(content: &str) -> &str {
        static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").expect("valid regex")
        });

        if let Some(m) = JSON_BLOCK.captures(content).and_then(|caps| caps.get(1)) {
            return m.as_str().trim();
        }

        content
    }

    /// Parse a reply, repairing common malformations.
    pub(crate) fn parse_reply(content: &str) -> Option<Value> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let json_str = Self::extract_json(content);

        match serde_json::from_str(json_str) {
            Ok(v) => Some(v),
            Err(e) => {
                let fixed = json_str
                    .replace('\'', "\"")
                    .replace(",]", "]")
                    .replace(",}", "}");
                match serde_json::from_str(&fixed) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("Failed to parse extraction reply: {}", e);
                        None
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StructuredExtractor for LlmStructuredExtractor {
    async fn extract_structured(
        &self,
        context: &str,
        schema: OutputSchema,
        instructions: &str,
    ) -> KgResult<Option<Value>> {
        let messages = vec![
            Message::system(Self::system_prompt(schema)),
            Message::user(Self::user_prompt(context, instructions)),
        ];

        let options = GenerationOptions {
            temperature: Some(0.0),
            response_format: self
                .llm
                .supports_json_mode()
                .then_some(ResponseFormat::Json),
            ..Default::default()
        };

        let response = self.llm.generate(&messages, Some(options)).await?;
        Ok(Self::parse_reply(response.content_or_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LlmResponse;
    use std::sync::Mutex;

    struct MockLlm {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Llm for MockLlm {
        async fn generate(
            &self,
            messages: &[Message],
            _: Option<GenerationOptions>,
        ) -> KgResult<LlmResponse> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.extend(messages.iter().map(|m| m.content.clone()));
            Ok(LlmResponse::text(self.reply.clone()))
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    fn mock(reply: &str) -> Arc<MockLlm> {
        Arc::new(MockLlm {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_extract_valid_json() {
        let llm = mock(r#"{"entities": [{"label": "gene", "name": "TP53"}]}"#);
        let extractor = LlmStructuredExtractor::new(llm.clone());

        let value = extractor
            .extract_structured("TP53 is a gene.", OutputSchema::Entities, "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value["entities"][0]["name"], "TP53");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"entities\""));
        assert!(prompts[1].contains("TP53 is a gene."));
    }

    #[tokio::test]
    async fn test_instructions_included() {
        let llm = mock("{}");
        let extractor = LlmStructuredExtractor::new(llm.clone());
        extractor
            .extract_structured("ctx", OutputSchema::Relationships, "Use only: tp53, mdm2")
            .await
            .unwrap();

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("startNode"));
        assert!(prompts[1].contains("Use only: tp53, mdm2"));
    }

    #[test]
    fn test_parse_code_block() {
        let reply = "Here you go:\n```json\n{\"entities\": []}\n```";
        let value = LlmStructuredExtractor::parse_reply(reply).unwrap();
        assert!(value["entities"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_parse_lenient() {
        let reply = "{'entities': [{'label': 'gene', 'name': 'brca1'},]}";
        let value = LlmStructuredExtractor::parse_reply(reply).unwrap();
        assert_eq!(value["entities"][0]["name"], "brca1");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(LlmStructuredExtractor::parse_reply("not json at all").is_none());
        assert!(LlmStructuredExtractor::parse_reply("   ").is_none());
    }
}
