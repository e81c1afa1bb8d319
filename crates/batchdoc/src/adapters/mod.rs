//! Boundaries to the external classification and extraction engines.
//!
//! The engines are blocking collaborators behind [`Classifier`] and
//! [`Extractor`]. The adapters wrap them with the retry policy and turn
//! exhausted transient failures into degraded results.

pub mod classify;
pub mod extract;

use thiserror::Error;

use crate::model::{Classification, DocumentRef, Extraction};

pub use classify::ClassificationAdapter;
pub use extract::ExtractionAdapter;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// Timeouts, throttling, unavailable backends. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The call was rejected outright; retrying cannot help.
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl AdapterError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

pub trait Classifier: Send + Sync {
    fn classify(&self, document: &DocumentRef) -> Result<Classification, AdapterError>;
}

pub trait Extractor: Send + Sync {
    /// `label` is the classification result, passed as a processor hint.
    fn extract(&self, document: &DocumentRef, label: &str) -> Result<Extraction, AdapterError>;
}

/// Result of an adapter call after retries.
#[derive(Debug, Clone)]
pub struct AdapterCall<T> {
    pub value: T,
    pub attempts: u32,
    /// Why a substitute value was returned, if one was.
    pub degraded: Option<String>,
}

impl<T> AdapterCall<T> {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// A call that failed permanently and must fail the document.
#[derive(Error, Debug, Clone)]
#[error("{stage} failed after {attempts} attempt(s): {source}")]
pub struct AdapterFailure {
    pub stage: &'static str,
    pub attempts: u32,
    #[source]
    pub source: AdapterError,
}
