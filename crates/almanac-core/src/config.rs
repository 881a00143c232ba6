use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AlmanacError, Result};

/// Top-level configuration for Almanac.
///
/// Loaded from `~/.almanac/config.toml` by default. Each section
/// corresponds to one stage of the source and retrieval pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlmanacConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub summarization: SummarizationConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl AlmanacConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AlmanacConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not
    /// exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.chars_per_token == 0 {
            return Err(AlmanacError::Config(
                "retrieval.chars_per_token must be greater than 0".to_string(),
            ));
        }
        if self.search.max_limit == 0 {
            return Err(AlmanacError::Config(
                "search.max_limit must be greater than 0".to_string(),
            ));
        }
        if self.transcription.poll_interval_ms == 0 {
            return Err(AlmanacError::Config(
                "transcription.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        for (section, secs) in [
            ("transcription", self.transcription.request_timeout_secs),
            ("summarization", self.summarization.request_timeout_secs),
            ("chat", self.chat.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(AlmanacError::Config(format!(
                    "{}.request_timeout_secs must be greater than 0",
                    section
                )));
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Transcription gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Provider name recorded on each source.
    pub provider: String,
    /// Interval between gateway status polls.
    pub poll_interval_ms: u64,
    /// Age after which an outstanding job is treated as failed.
    pub job_timeout_secs: u64,
    /// Timeout for a single submit or poll call.
    pub request_timeout_secs: u64,
}

impl TranscriptionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            poll_interval_ms: 2_000,
            job_timeout_secs: 1_800,
            request_timeout_secs: 30,
        }
    }
}

/// Summary generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Summarize every source as soon as its content is ready.
    pub auto_summarize: bool,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Require the reply to be a bare JSON object instead of extracting one from prose.
    pub strict_json: bool,
}

impl SummarizationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            auto_summarize: true,
            max_tokens: 1024,
            request_timeout_secs: 60,
            strict_json: false,
        }
    }
}

/// Full-text search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Queries shorter than this return no results.
    pub min_query_chars: usize,
    pub default_limit: usize,
    pub max_limit: usize,
    /// Characters of context kept on each side of a match.
    pub excerpt_radius: usize,
    /// Excerpts returned per result.
    pub max_excerpts: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_query_chars: 2,
            default_limit: 20,
            max_limit: 100,
            excerpt_radius: 80,
            max_excerpts: 2,
        }
    }
}

/// Context assembly settings for grounded chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default token budget for retrieved excerpts.
    pub token_budget: usize,
    /// Maximum number of sources embedded in one prompt.
    pub max_sources: usize,
    pub chars_per_token: usize,
    /// Sources must score strictly above this to be used.
    pub relevance_floor: f64,
    /// Stop adding sources once less than this many tokens remain.
    pub min_excerpt_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            token_budget: 3_000,
            max_sources: 8,
            chars_per_token: 4,
            relevance_floor: 0.0,
            min_excerpt_tokens: 16,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Prior exchanges (a user message and its reply) replayed into the
    /// generation prompt.
    pub history_turns: usize,
    pub max_message_chars: usize,
    pub max_reply_tokens: u32,
    pub request_timeout_secs: u64,
    pub first_message_preview_chars: usize,
}

impl ChatConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: 6,
            max_message_chars: 4_000,
            max_reply_tokens: 1024,
            request_timeout_secs: 60,
            first_message_preview_chars: 120,
        }
    }
}
