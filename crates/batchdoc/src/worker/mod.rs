pub mod job;
pub mod pool;

pub use job::{DocumentJob, DocumentOutcome, OutcomeStatus};
pub use pool::WorkerPool;

// Re-export crossbeam_channel for callers wiring their own publishers
pub use crossbeam_channel;
