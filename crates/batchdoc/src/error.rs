use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchdocError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl BatchdocError {
    /// Pipeline stage the error belongs to, as reported in error responses.
    pub fn stage(&self) -> &'static str {
        match self {
            BatchdocError::Config(_) => "CONFIGURATION",
            BatchdocError::Trigger(_) => "TRIGGER",
            BatchdocError::Discovery(_) => "LIST_FOLDER",
            BatchdocError::Store(_) => "BATCH_RECORD",
            BatchdocError::Worker(_) => "DISPATCH",
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            BatchdocError::Config(_) => "INVALID_CONFIGURATION",
            BatchdocError::Trigger(_) => "INVALID_TRIGGER",
            BatchdocError::Discovery(_) => "DISCOVERY_FAILED",
            BatchdocError::Store(_) => "STORE_UNAVAILABLE",
            BatchdocError::Worker(_) => "WORKER_POOL_FAILED",
        }
    }

    /// Whether the failure was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, BatchdocError::Trigger(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid sentinel pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid value '{value}' for environment variable {name}: {reason}")]
    InvalidEnv {
        name: String,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Trigger is missing the source location")]
    MissingLocation,

    #[error("Trigger is missing the object name")]
    MissingObjectName,
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to list objects under '{location}/{prefix}': {source}")]
    Listing {
        location: String,
        prefix: String,
        #[source]
        source: crate::source::SourceError,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Timed out waiting to dispatch document")]
    DispatchTimeout,
}

pub type Result<T> = std::result::Result<T, BatchdocError>;
