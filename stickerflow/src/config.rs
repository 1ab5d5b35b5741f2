//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. The per-stage budgets are policy, not structure: each call
//! site reads its own [`StagePolicy`].

use crate::errors::ConfigError;
use crate::logging::LogFormat;
use crate::retry::RetryPolicy;
use crate::scheduler::BatchPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

/// Scheduler batch plus per-task retry budget for one fan-out stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePolicy {
    /// Admission policy for the stage's batch.
    #[serde(default)]
    pub batch: BatchPolicy,
    /// Retry budget for each task in the batch.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl StagePolicy {
    /// Creates a stage policy.
    #[must_use]
    pub fn new(batch: BatchPolicy, retry: RetryPolicy) -> Self {
        Self { batch, retry }
    }
}

fn default_download() -> StagePolicy {
    StagePolicy::new(
        BatchPolicy::new(5, Duration::from_millis(300)).with_timeout(Duration::from_secs(20)),
        RetryPolicy::immediate(3),
    )
}

fn default_upload() -> StagePolicy {
    StagePolicy::new(
        BatchPolicy::new(5, Duration::from_millis(1800)).with_timeout(Duration::from_secs(60)),
        RetryPolicy::fixed(3, Duration::from_millis(1000)),
    )
}

fn default_append() -> StagePolicy {
    StagePolicy::new(
        BatchPolicy::new(2, Duration::from_millis(1500)).with_timeout(Duration::from_secs(80)),
        RetryPolicy::fixed(5, Duration::from_millis(1000)),
    )
}

fn default_create_set_retry() -> RetryPolicy {
    RetryPolicy::immediate(1)
}

/// Derives destination set names and titles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetNaming {
    /// Bot account that owns created sets.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
    /// Prepended to the set id.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Titles longer than this many characters are truncated.
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,
}

fn default_bot_username() -> String {
    "stickerflow_bot".to_string()
}

fn default_name_prefix() -> String {
    "pack_".to_string()
}

fn default_max_title_len() -> usize {
    64
}

impl Default for SetNaming {
    fn default() -> Self {
        Self {
            bot_username: default_bot_username(),
            name_prefix: default_name_prefix(),
            max_title_len: default_max_title_len(),
        }
    }
}

fn invalid_name_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9_]+").expect("valid regex"))
}

fn repeated_underscores() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"_{2,}").expect("valid regex"))
}

impl SetNaming {
    /// Sets the bot username.
    #[must_use]
    pub fn with_bot_username(mut self, bot: impl Into<String>) -> Self {
        self.bot_username = bot.into();
        self
    }

    /// Sets the name prefix.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Sets the title length limit.
    #[must_use]
    pub fn with_max_title_len(mut self, len: usize) -> Self {
        self.max_title_len = len;
        self
    }

    /// Returns `<prefix><set id>_by_<bot>`, lower-cased and restricted to `[a-z0-9_]`.
    #[must_use]
    pub fn set_name(&self, set_id: u64) -> String {
        let raw = format!("{}{}_by_{}", self.name_prefix, set_id, self.bot_username).to_lowercase();
        let cleaned = invalid_name_chars().replace_all(&raw, "_");
        let collapsed = repeated_underscores().replace_all(&cleaned, "_");
        let name = collapsed.trim_start_matches('_');

        if name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            name.to_string()
        } else {
            format!("s{name}")
        }
    }

    /// Returns the display title, truncated to `max_title_len` characters.
    #[must_use]
    pub fn set_title(&self, display_name: &str) -> String {
        display_name
            .trim()
            .chars()
            .take(self.max_title_len)
            .collect::<String>()
            .trim_end()
            .to_string()
    }
}

/// Output canvas for normalized stickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Edge length of the square canvas in pixels.
    #[serde(default = "default_canvas_size")]
    pub size: u32,
    /// Border pixels with alpha at or below this value are trimmed.
    #[serde(default)]
    pub trim_alpha_threshold: u8,
}

fn default_canvas_size() -> u32 {
    512
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            size: default_canvas_size(),
            trim_alpha_threshold: 0,
        }
    }
}

/// Top-level configuration for a [`StickerPipeline`](crate::pipeline::StickerPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source download stage.
    #[serde(default = "default_download")]
    pub download: StagePolicy,
    /// Artifact upload stage.
    #[serde(default = "default_upload")]
    pub upload: StagePolicy,
    /// Append-remaining stage.
    #[serde(default = "default_append")]
    pub append: StagePolicy,
    /// Budget for the single create-set call.
    #[serde(default = "default_create_set_retry")]
    pub create_set_retry: RetryPolicy,
    /// Set name and title derivation.
    #[serde(default)]
    pub naming: SetNaming,
    /// Normalizer canvas.
    #[serde(default)]
    pub canvas: CanvasConfig,
    /// Log line format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download: default_download(),
            upload: default_upload(),
            append: default_append(),
            create_set_retry: default_create_set_retry(),
            naming: SetNaming::default(),
            canvas: CanvasConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Sets the download stage policy.
    #[must_use]
    pub fn with_download(mut self, policy: StagePolicy) -> Self {
        self.download = policy;
        self
    }

    /// Sets the upload stage policy.
    #[must_use]
    pub fn with_upload(mut self, policy: StagePolicy) -> Self {
        self.upload = policy;
        self
    }

    /// Sets the append stage policy.
    #[must_use]
    pub fn with_append(mut self, policy: StagePolicy) -> Self {
        self.append = policy;
        self
    }

    /// Sets the create-set retry budget.
    #[must_use]
    pub fn with_create_set_retry(mut self, policy: RetryPolicy) -> Self {
        self.create_set_retry = policy;
        self
    }

    /// Sets the naming rules.
    #[must_use]
    pub fn with_naming(mut self, naming: SetNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Sets the canvas.
    #[must_use]
    pub fn with_canvas(mut self, canvas: CanvasConfig) -> Self {
        self.canvas = canvas;
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, stage) in [
            ("download", &self.download),
            ("upload", &self.upload),
            ("append", &self.append),
        ] {
            if stage.batch.max_concurrent == 0 {
                return Err(ConfigError::invalid(
                    format!("{name}.batch.max_concurrent"),
                    "must be at least 1",
                ));
            }
            if stage.retry.max_attempts == 0 {
                return Err(ConfigError::invalid(
                    format!("{name}.retry.max_attempts"),
                    "must be at least 1",
                ));
            }
        }

        if self.create_set_retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "create_set_retry.max_attempts",
                "must be at least 1",
            ));
        }

        let bot = &self.naming.bot_username;
        if bot.is_empty() || !bot.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::invalid(
                "naming.bot_username",
                "must be a non-empty run of letters, digits and underscores",
            ));
        }

        if self.naming.max_title_len == 0 {
            return Err(ConfigError::invalid("naming.max_title_len", "must be at least 1"));
        }

        if self.canvas.size == 0 {
            return Err(ConfigError::invalid("canvas.size", "must be at least 1"));
        }

        Ok(())
    }
}
