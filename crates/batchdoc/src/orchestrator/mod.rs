//! Batch orchestration: from a sentinel notification to a terminal batch
//! status.
//!
//! The orchestrator resolves the trigger, makes sure the batch record
//! exists, discovers members, rejects structurally invalid documents inline
//! and fans the rest out to a [`WorkerPool`]. It waits for every outcome or
//! the batch deadline, whichever comes first. A complete batch gets its
//! terminal status written exactly once; a batch cut short by the deadline
//! stays `processing` until a redelivered trigger finishes it.

pub mod discovery;
pub mod response;
pub mod trigger;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::adapters::{Classifier, Extractor};
use crate::broadcast::document_progress::{DocumentProgressBroadcaster, DocumentProgressEvent};
use crate::error::{BatchdocError, Result, WorkerError};
use crate::model::{BatchRecord, BatchStatus, DocumentRef};
use crate::pipeline::dead_letter::{DeadLetterPublisher, DeadLetterRouter};
use crate::pipeline::progress::{BroadcastProgress, NoopProgress, ProgressReporter};
use crate::pipeline::{DocumentWorker, PipelineConfig};
use crate::sanitize;
use crate::source::ObjectSource;
use crate::store::{BatchInit, DocumentStore};
use crate::worker::job::{DocumentJob, DocumentOutcome, OutcomeStatus};
use crate::worker::WorkerPool;

pub use discovery::{discover, Discovery};
pub use response::{BatchSummary, ErrorDetail, InvocationResponse, ResponseBody, ResponseStatus};
pub use trigger::{
    derive_batch_id, normalize_prefix, parse_trigger, sentinel_prefix, BatchTrigger,
    TriggerAction, TriggerEvent,
};

pub struct BatchOrchestrator {
    config: Arc<PipelineConfig>,
    store: Arc<dyn DocumentStore>,
    source: Arc<dyn ObjectSource>,
    worker: Arc<DocumentWorker>,
    progress_sender: Option<Arc<broadcast::Sender<DocumentProgressEvent>>>,
}

impl BatchOrchestrator {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn DocumentStore>,
        source: Arc<dyn ObjectSource>,
        classifier: Arc<dyn Classifier>,
        extractor: Arc<dyn Extractor>,
        publisher: Arc<dyn DeadLetterPublisher>,
    ) -> Self {
        let dead_letter = Arc::new(DeadLetterRouter::new(publisher, &config.dead_letter_topic));
        let worker = Arc::new(DocumentWorker::new(
            &config,
            Arc::clone(&store),
            Arc::clone(&source),
            classifier,
            extractor,
            dead_letter,
        ));

        Self {
            config: Arc::new(config),
            store,
            source,
            worker,
            progress_sender: None,
        }
    }

    /// Streams per-document phases to the broadcaster's subscribers.
    pub fn with_progress(mut self, broadcaster: &DocumentProgressBroadcaster) -> Self {
        self.progress_sender = Some(broadcaster.sender());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Entry point for one delivered notification. Never panics on bad
    /// input; every failure becomes a structured response.
    pub fn handle(&self, event: &TriggerEvent) -> InvocationResponse {
        let trigger = match parse_trigger(event, &self.config) {
            Ok(TriggerAction::Process(trigger)) => trigger,
            Ok(TriggerAction::Ignore) => {
                info!(
                    object = %sanitize::redact_object_name(&event.object_name),
                    "Not a sentinel object, ignoring"
                );
                return InvocationResponse::ignored(&event.object_name);
            }
            Err(e) => {
                let err = BatchdocError::from(e);
                log_batch_error(None, &err);
                return InvocationResponse::error(None, &err);
            }
        };

        match self.run_batch(&trigger) {
            Ok(summary) => InvocationResponse::from_summary(&summary),
            Err(err) => {
                log_batch_error(Some(&trigger.batch_id), &err);
                InvocationResponse::error(Some(&trigger.batch_id), &err)
            }
        }
    }

    /// Runs a resolved batch to its terminal status.
    ///
    /// Fails only when the batch record cannot be written or discovery
    /// fails; per-document problems are reported in the summary.
    pub fn run_batch(&self, trigger: &BatchTrigger) -> Result<BatchSummary> {
        let deadline = Instant::now() + self.config.batch_timeout;
        let _batch_span = info_span!("batch",
            batch_id = %trigger.batch_id,
            prefix = %sanitize::hash_prefix(&trigger.prefix),
        )
        .entered();

        let record = BatchRecord::new(
            &trigger.batch_id,
            &trigger.location,
            &trigger.prefix,
            Utc::now(),
        );
        let init = self.store.ensure_batch(&record)?;

        info!(
            event_type = "batch_processing_start",
            location = %trigger.location,
            trigger_id = trigger.trigger_id.as_deref().unwrap_or(""),
            refreshed = (init == BatchInit::Refreshed),
            "Batch processing started"
        );

        let discovery = discover(self.source.as_ref(), &self.config, trigger)?;
        let document_count = discovery.members.len();
        info!(document_count, truncated = discovery.truncated, "Discovered batch members");

        if let Err(e) = self
            .store
            .set_member_count(&trigger.batch_id, document_count as u64)
        {
            warn!(error = %e, "Failed to record member count");
        }

        if discovery.is_empty() {
            info!("No documents to process");
            return Ok(self.finish(trigger, 0, Vec::new(), discovery.truncated, false));
        }

        let mut outcomes = Vec::with_capacity(document_count);
        let mut admitted = Vec::with_capacity(document_count);

        for member in &discovery.members {
            let job = DocumentJob::new(
                &trigger.batch_id,
                DocumentRef::new(
                    &trigger.location,
                    &member.name,
                    member.content_version.as_deref(),
                ),
            );
            match self.worker.validator().validate_header(&job.source) {
                Ok(()) => admitted.push(job),
                Err(invalid) => {
                    let progress = self.reporter_for(&job);
                    outcomes.push(self.worker.reject(job, &invalid, progress.as_ref()));
                }
            }
        }

        let timed_out = if admitted.is_empty() {
            false
        } else {
            self.dispatch(admitted, deadline, &mut outcomes)?
        };

        Ok(self.finish(
            trigger,
            document_count,
            outcomes,
            discovery.truncated,
            timed_out,
        ))
    }

    /// Runs `jobs` on a fresh pool. Returns whether the batch was cut short;
    /// unfinished documents are reported as timed out.
    fn dispatch(
        &self,
        jobs: Vec<DocumentJob>,
        deadline: Instant,
        outcomes: &mut Vec<DocumentOutcome>,
    ) -> Result<bool> {
        let pool_size = self.config.max_concurrency.min(jobs.len());
        let pool = WorkerPool::with_progress_sender(
            Arc::clone(&self.worker),
            pool_size,
            self.progress_sender.clone(),
        )?;

        let mut pending = jobs.clone();
        let mut timed_out = false;

        for job in jobs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match pool.submit(job, remaining) {
                Ok(()) => {}
                Err(WorkerError::DispatchTimeout) => {
                    timed_out = true;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Dispatch stopped early");
                    break;
                }
            }
        }

        while !pending.is_empty() && !timed_out {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                timed_out = true;
                break;
            }
            match pool.recv_result_timeout(remaining) {
                Some(outcome) => collect(outcome, &mut pending, outcomes),
                None if Instant::now() >= deadline => timed_out = true,
                None => break,
            }
        }

        if pending.is_empty() {
            pool.wait();
            return Ok(timed_out);
        }

        pool.shutdown();
        while let Some(outcome) = pool.try_recv_result() {
            collect(outcome, &mut pending, outcomes);
        }
        pool.abandon();

        warn!(
            unfinished = pending.len(),
            timed_out,
            "Batch ended with unfinished documents"
        );
        // A worker may still hold the lease and write the real result; a
        // redelivered trigger reclaims it once stale.
        for job in pending {
            outcomes.push(DocumentOutcome::timed_out(&job));
        }

        Ok(true)
    }

    fn finish(
        &self,
        trigger: &BatchTrigger,
        document_count: usize,
        outcomes: Vec<DocumentOutcome>,
        truncated: bool,
        timed_out: bool,
    ) -> BatchSummary {
        let status = if timed_out {
            BatchStatus::Processing
        } else if outcomes.iter().any(|o| o.status.is_error()) {
            BatchStatus::DoneWithErrors
        } else {
            BatchStatus::Done
        };

        if timed_out {
            warn!("Batch left processing until a redelivered trigger completes it");
        } else {
            match self
                .store
                .complete_batch(&trigger.batch_id, status, Utc::now())
            {
                Ok(true) => {}
                Ok(false) => debug!("Batch already terminal, status left unchanged"),
                Err(e) => error!(error = %e, "Failed to write terminal batch status"),
            }
        }

        let summary = BatchSummary {
            batch_id: trigger.batch_id.clone(),
            status,
            document_count,
            outcomes,
            truncated,
            timed_out,
        };

        info!(
            event_type = "batch_processing_complete",
            document_count,
            successful = summary.count(OutcomeStatus::Done),
            errors = summary.error_count(),
            skipped = summary.count(OutcomeStatus::Skipped),
            unfinished = summary.count(OutcomeStatus::TimedOut),
            from_cache = summary.from_cache_count(),
            final_status = %status,
            timed_out,
            "Batch processing complete"
        );

        summary
    }

    fn reporter_for(&self, job: &DocumentJob) -> Box<dyn ProgressReporter> {
        match &self.progress_sender {
            Some(sender) => Box::new(BroadcastProgress::new(
                &job.batch_id,
                &job.document_id,
                &sanitize::redact_object_name(&job.source.object_name),
                Arc::clone(sender),
            )),
            None => Box::new(NoopProgress),
        }
    }
}

fn collect(
    outcome: DocumentOutcome,
    pending: &mut Vec<DocumentJob>,
    outcomes: &mut Vec<DocumentOutcome>,
) {
    if let Some(index) = pending
        .iter()
        .position(|job| job.document_id == outcome.document_id)
    {
        pending.swap_remove(index);
    }
    outcomes.push(outcome);
}

fn log_batch_error(batch_id: Option<&str>, err: &BatchdocError) {
    error!(
        event_type = "batch_processing_error",
        batch_id = batch_id.unwrap_or(""),
        stage = err.stage(),
        code = err.code(),
        error = %err,
        "Batch processing failed"
    );
}
