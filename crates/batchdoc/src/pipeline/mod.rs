pub mod config;
pub mod context;
pub mod dead_letter;
pub mod lease;
pub mod persist;
pub mod progress;
pub mod runner;
pub mod validate;

pub use config::PipelineConfig;
pub use context::DocumentContext;
pub use dead_letter::{
    ChannelPublisher, DeadLetterMessage, DeadLetterPublisher, DeadLetterRouter, DisabledPublisher,
    JsonLinesPublisher, PublishError,
};
pub use lease::{LeaseDecision, LeaseManager};
pub use persist::{PersistReport, ResultPersister};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::DocumentWorker;
pub use validate::{check_header, DocumentValidator, InvalidDocument};
