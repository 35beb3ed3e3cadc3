//! Configuration system for kgweave.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{KgError, KgResult};
use crate::graph::RepresentativePolicy;
use crate::traits::{EmbedderConfig, EmbedderProvider, LlmConfig};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAI,
}

/// Provider configuration with type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type.
    pub provider: LlmProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: LlmConfig,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            config: LlmConfig {
                model: "deepseek-r1:32b".to_string(),
                ..Default::default()
            },
        }
    }
}

/// Embedder provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderProviderConfig {
    /// Provider type.
    pub provider: EmbedderProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: EmbedderConfig,
}

impl Default for EmbedderProviderConfig {
    fn default() -> Self {
        Self {
            provider: EmbedderProvider::Ollama,
            config: EmbedderConfig::default(),
        }
    }
}

/// Labels accepted from the extraction step by default.
pub const DEFAULT_ALLOWED_LABELS: &[&str] = &[
    "gene",
    "protein",
    "disease",
    "drug",
    "chemical",
    "metabolite",
    "variant",
    "cell_line",
    "region",
    "cell_type",
    "processes",
    "pathway",
];

/// Settings for the extraction gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Attempts per extraction call before giving up.
    pub max_tries: u32,
    /// Extra relationship passes aimed at entities left without edges.
    pub max_tries_isolated_entities: u32,
    /// Initial delay between attempts in milliseconds (0 disables waiting).
    pub retry_delay_ms: u64,
    /// Upper bound for the exponential retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Weight of the name vector in an entity embedding.
    pub entity_name_weight: f32,
    /// Weight of the label vector in an entity embedding.
    pub entity_label_weight: f32,
    /// Minimum similarity for resolving a relationship endpoint that does
    /// not name an entity verbatim.
    pub endpoint_threshold: f32,
    /// Accepted entity labels (normalised). Empty accepts every label.
    pub allowed_labels: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_tries: 5,
            max_tries_isolated_entities: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 10_000,
            entity_name_weight: 0.6,
            entity_label_weight: 0.4,
            endpoint_threshold: 0.8,
            allowed_labels: DEFAULT_ALLOWED_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExtractionConfig {
    /// Set the attempt budget.
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    /// Disable waiting between attempts.
    pub fn without_delay(mut self) -> Self {
        self.retry_delay_ms = 0;
        self
    }

    /// Replace the accepted label list.
    pub fn with_allowed_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// Settings for building one document graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Similarity cutoff for merging entities.
    pub ent_threshold: f32,
    /// Similarity cutoff for merging relationships.
    pub rel_threshold: f32,
    /// How a group of identifier-matched entities picks its survivor.
    pub representative_policy: RepresentativePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            ent_threshold: 0.9,
            rel_threshold: 0.4,
            representative_policy: RepresentativePolicy::default(),
        }
    }
}

impl BuildConfig {
    pub fn with_thresholds(mut self, ent_threshold: f32, rel_threshold: f32) -> Self {
        self.ent_threshold = ent_threshold;
        self.rel_threshold = rel_threshold;
        self
    }

    pub fn with_representative_policy(mut self, policy: RepresentativePolicy) -> Self {
        self.representative_policy = policy;
        self
    }
}

/// Settings for the batch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of concurrent document workers.
    pub concurrency: usize,
    /// Skip documents whose output already exists.
    pub skip_existing: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            skip_existing: true,
        }
    }
}

/// Main kgweave configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KgConfig {
    /// LLM configuration.
    pub llm: LlmProviderConfig,
    /// Embedder configuration.
    pub embedder: EmbedderProviderConfig,
    /// Extraction gateway configuration.
    pub extraction: ExtractionConfig,
    /// Graph builder configuration.
    pub build: BuildConfig,
    /// Batch driver configuration.
    pub batch: BatchConfig,
    /// Directory holding one `<id>.json` document per work item.
    pub input_dir: PathBuf,
    /// Directory receiving one `<id>.json` graph per work item.
    pub output_dir: PathBuf,
}

impl Default for KgConfig {
    fn default() -> Self {
        let kgweave_dir = dirs::home_dir()
            .map(|h| h.join(".kgweave"))
            .unwrap_or_else(|| PathBuf::from(".kgweave"));

        Self {
            llm: LlmProviderConfig::default(),
            embedder: EmbedderProviderConfig::default(),
            extraction: ExtractionConfig::default(),
            build: BuildConfig::default(),
            batch: BatchConfig::default(),
            input_dir: kgweave_dir.join("documents"),
            output_dir: kgweave_dir.join("graphs"),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl KgConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> KgResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| KgError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| KgError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| KgError::Configuration(e.to_string())),
            _ => Err(KgError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `KGWEAVE_*` environment variables.
    ///
    /// Reads:
    /// - `KGWEAVE_LLM_PROVIDER` / `KGWEAVE_LLM_MODEL` / `KGWEAVE_LLM_BASE_URL`
    /// - `KGWEAVE_EMBEDDER_PROVIDER` / `KGWEAVE_EMBEDDER_MODEL` /
    ///   `KGWEAVE_EMBEDDER_DIMS` / `KGWEAVE_EMBEDDER_BASE_URL`
    /// - `OPENAI_API_KEY`
    /// - `KGWEAVE_ENT_THRESHOLD` / `KGWEAVE_REL_THRESHOLD`
    /// - `KGWEAVE_MAX_TRIES` / `KGWEAVE_RETRY_DELAY_MS`
    /// - `KGWEAVE_CONCURRENCY`
    /// - `KGWEAVE_INPUT_DIR` / `KGWEAVE_OUTPUT_DIR`
    pub fn apply_env(&mut self) {
        if let Ok(provider) = std::env::var("KGWEAVE_LLM_PROVIDER") {
            self.llm.provider = match provider.to_lowercase().as_str() {
                "openai" => LlmProvider::OpenAI,
                _ => LlmProvider::Ollama,
            };
        }
        if let Ok(model) = std::env::var("KGWEAVE_LLM_MODEL") {
            self.llm.config.model = model;
        }
        if let Ok(url) = std::env::var("KGWEAVE_LLM_BASE_URL") {
            self.llm.config.base_url = Some(url);
        }

        if let Ok(provider) = std::env::var("KGWEAVE_EMBEDDER_PROVIDER") {
            self.embedder.provider = match provider.to_lowercase().as_str() {
                "openai" => EmbedderProvider::OpenAI,
                _ => EmbedderProvider::Ollama,
            };
        }
        if let Ok(model) = std::env::var("KGWEAVE_EMBEDDER_MODEL") {
            self.embedder.config.model = model;
        }
        if let Some(dims) = env_parse("KGWEAVE_EMBEDDER_DIMS") {
            self.embedder.config.embedding_dims = dims;
        }
        if let Ok(url) = std::env::var("KGWEAVE_EMBEDDER_BASE_URL") {
            self.embedder.config.base_url = Some(url);
        }

        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            self.llm.config.api_key = Some(api_key.clone());
            self.embedder.config.api_key = Some(api_key);
        }

        if let Some(t) = env_parse("KGWEAVE_ENT_THRESHOLD") {
            self.build.ent_threshold = t;
        }
        if let Some(t) = env_parse("KGWEAVE_REL_THRESHOLD") {
            self.build.rel_threshold = t;
        }
        if let Some(n) = env_parse("KGWEAVE_MAX_TRIES") {
            self.extraction.max_tries = n;
        }
        if let Some(ms) = env_parse("KGWEAVE_RETRY_DELAY_MS") {
            self.extraction.retry_delay_ms = ms;
        }
        if let Some(n) = env_parse("KGWEAVE_CONCURRENCY") {
            self.batch.concurrency = n;
        }

        if let Ok(dir) = std::env::var("KGWEAVE_INPUT_DIR") {
            self.input_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("KGWEAVE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> KgResult<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(KgError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, v
                )))
            }
        };
        unit("build.ent_threshold", self.build.ent_threshold)?;
        unit("build.rel_threshold", self.build.rel_threshold)?;
        unit("extraction.endpoint_threshold", self.extraction.endpoint_threshold)?;

        if self.extraction.max_tries == 0 {
            return Err(KgError::Configuration(
                "extraction.max_tries must be at least 1".to_string(),
            ));
        }
        if self.batch.concurrency == 0 {
            return Err(KgError::Configuration(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> KgConfigBuilder {
        KgConfigBuilder::default()
    }
}

/// Builder for KgConfig.
#[derive(Default)]
pub struct KgConfigBuilder {
    config: KgConfig,
}

impl KgConfigBuilder {
    /// Set LLM configuration.
    pub fn llm(mut self, config: LlmProviderConfig) -> Self {
        self.config.llm = config;
        self
    }

    /// Set embedder configuration.
    pub fn embedder(mut self, config: EmbedderProviderConfig) -> Self {
        self.config.embedder = config;
        self
    }

    /// Set extraction configuration.
    pub fn extraction(mut self, config: ExtractionConfig) -> Self {
        self.config.extraction = config;
        self
    }

    /// Set build configuration.
    pub fn build_config(mut self, config: BuildConfig) -> Self {
        self.config.build = config;
        self
    }

    /// Set batch concurrency.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.batch.concurrency = concurrency;
        self
    }

    /// Set the document directory.
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    /// Set the graph output directory.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> KgConfig {
        self.config
    }
}
