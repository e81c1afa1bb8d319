pub mod adapters;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod sanitize;
pub mod source;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use adapters::{AdapterError, Classifier, Extractor};
pub use broadcast::{DocumentPhase, DocumentProgressBroadcaster, DocumentProgressEvent};
pub use config::{load_settings, load_settings_from_str, PipelineSettings};
pub use db::{Database, SqliteStore};
pub use error::{BatchdocError, ConfigError, DiscoveryError, Result, TriggerError, WorkerError};
pub use orchestrator::{BatchOrchestrator, BatchSummary, InvocationResponse, TriggerEvent};
pub use pipeline::{
    ChannelPublisher, DeadLetterMessage, DeadLetterPublisher, JsonLinesPublisher, PipelineConfig,
};
pub use retry::{RetryError, RetryPolicy};
pub use source::{LocalObjectSource, MemoryObjectSource, ObjectEntry, ObjectSource};
pub use store::{DocumentStore, InMemoryStore, StoreError};
pub use worker::{DocumentOutcome, OutcomeStatus};
