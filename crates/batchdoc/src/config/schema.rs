use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_version")]
    pub version: String,
    /// Maximum number of documents processed in parallel.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Upper bound on objects listed per invocation.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Lowercase extensions (without dot) admitted by discovery.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Regex matched against an object's base name to detect the batch-ready marker.
    #[serde(default = "default_sentinel_pattern")]
    pub sentinel_pattern: String,
    /// How long the orchestrator waits for dispatched documents.
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub lease: LeaseSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub dead_letter: DeadLetterSettings,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_max_concurrency() -> usize {
    8
}

fn default_max_items() -> usize {
    500
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

fn default_sentinel_pattern() -> String {
    "^is_ready$".to_string()
}

fn default_batch_timeout_secs() -> u64 {
    540
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            max_concurrency: default_max_concurrency(),
            max_items: default_max_items(),
            allowed_extensions: default_allowed_extensions(),
            sentinel_pattern: default_sentinel_pattern(),
            batch_timeout_secs: default_batch_timeout_secs(),
            retry: RetrySettings::default(),
            lease: LeaseSettings::default(),
            validation: ValidationSettings::default(),
            dead_letter: DeadLetterSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_secs() -> f64 {
    1.0
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_secs() -> f64 {
    60.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            multiplier: default_multiplier(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseSettings {
    /// Lease age after which a `leased` document is considered abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    600
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StructuralCheck {
    /// Check the `%PDF-` magic bytes only.
    #[default]
    Header,
    /// Also parse the document and require at least one page.
    Parse,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationSettings {
    #[serde(default)]
    pub structural_check: StructuralCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterSettings {
    #[serde(default = "default_dead_letter_topic")]
    pub topic: String,
}

fn default_dead_letter_topic() -> String {
    "batchdoc-dead-letter".to_string()
}

impl Default for DeadLetterSettings {
    fn default() -> Self {
        Self {
            topic: default_dead_letter_topic(),
        }
    }
}
