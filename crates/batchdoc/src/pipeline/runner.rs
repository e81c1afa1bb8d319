use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, info_span, warn};

use crate::adapters::{ClassificationAdapter, Classifier, ExtractionAdapter, Extractor};
use crate::broadcast::document_progress::DocumentPhase;
use crate::model::{DocumentError, DocumentRecord, DocumentStatus, ErrorKind};
use crate::sanitize;
use crate::source::ObjectSource;
use crate::store::DocumentStore;
use crate::worker::job::{DocumentJob, DocumentOutcome};

use super::config::PipelineConfig;
use super::context::DocumentContext;
use super::dead_letter::DeadLetterRouter;
use super::lease::{LeaseDecision, LeaseManager};
use super::persist::ResultPersister;
use super::progress::{ProgressEvent, ProgressReporter};
use super::validate::{DocumentValidator, InvalidDocument};

/// Drives one document from lease to a persisted terminal state.
///
/// `NEW -> LEASED -> VALIDATED | REJECTED -> CLASSIFIED -> EXTRACTED ->
/// PERSISTED(done | failed)`. A document already `done` short-circuits to a
/// cached outcome; one leased elsewhere is skipped.
pub struct DocumentWorker {
    lease: LeaseManager,
    validator: DocumentValidator,
    classifier: ClassificationAdapter,
    extractor: ExtractionAdapter,
    persister: ResultPersister,
    dead_letter: Arc<DeadLetterRouter>,
    store: Arc<dyn DocumentStore>,
}

impl DocumentWorker {
    pub fn new(
        config: &PipelineConfig,
        store: Arc<dyn DocumentStore>,
        source: Arc<dyn ObjectSource>,
        classifier: Arc<dyn Classifier>,
        extractor: Arc<dyn Extractor>,
        dead_letter: Arc<DeadLetterRouter>,
    ) -> Self {
        Self {
            lease: LeaseManager::new(Arc::clone(&store), config.lease_stale_after),
            validator: DocumentValidator::new(source, config.structural_check),
            classifier: ClassificationAdapter::new(classifier, config.retry.clone()),
            extractor: ExtractionAdapter::new(extractor, config.retry.clone()),
            persister: ResultPersister::new(Arc::clone(&store)),
            dead_letter,
            store,
        }
    }

    pub fn validator(&self) -> &DocumentValidator {
        &self.validator
    }

    /// Runs the full state machine for one document.
    pub fn run(&self, job: DocumentJob, progress: &dyn ProgressReporter) -> DocumentOutcome {
        let file_name = sanitize::redact_object_name(&job.source.object_name);
        let _document_span = info_span!("document",
            batch_id = %job.batch_id,
            document_id = %job.document_id,
            file = %file_name,
        )
        .entered();

        let mut ctx = DocumentContext::new(job);

        // NEW -> LEASED
        let mut record = {
            let _step = info_span!("lease").entered();
            match self.claim(&mut ctx, progress) {
                Ok(record) => record,
                Err(outcome) => return outcome,
            }
        };

        // LEASED -> VALIDATED | REJECTED
        {
            let _step = info_span!("validate").entered();
            progress.report(ProgressEvent::Phase {
                phase: DocumentPhase::Validating,
                message: "Checking document structure".to_string(),
            });
            if let Err(invalid) = self.validator.validate(&ctx.job.source) {
                return self.fail(&ctx, record, invalid_document(&invalid), progress);
            }
        }

        // VALIDATED -> CLASSIFIED
        {
            let _step = info_span!("classify").entered();
            progress.report(ProgressEvent::Phase {
                phase: DocumentPhase::Classifying,
                message: "Classifying document".to_string(),
            });
            match self.classifier.classify(&ctx.job.source) {
                Ok(call) => ctx.classification = Some(call),
                Err(failure) => {
                    let error = DocumentError::new(
                        ErrorKind::ProcessingFailed,
                        failure.to_string(),
                        failure.attempts,
                    );
                    return self.fail(&ctx, record, error, progress);
                }
            }
        }

        let Some(classification) = ctx.classification.as_ref().map(|c| c.value.clone()) else {
            let error = DocumentError::new(ErrorKind::Unexpected, "classification missing", 0);
            return self.fail(&ctx, record, error, progress);
        };

        // CLASSIFIED -> EXTRACTED
        {
            let _step = info_span!("extract", label = %classification.label).entered();
            progress.report(ProgressEvent::Phase {
                phase: DocumentPhase::Extracting,
                message: format!("Extracting fields as {}", classification.label),
            });
            match self.extractor.extract(&ctx.job.source, &classification.label) {
                Ok(call) => ctx.extraction = Some(call),
                Err(failure) => {
                    let error = DocumentError::new(
                        ErrorKind::ProcessingFailed,
                        failure.to_string(),
                        ctx.attempts() + failure.attempts,
                    );
                    return self.fail(&ctx, record, error, progress);
                }
            }
        }

        let Some(extraction) = ctx.extraction.as_ref().map(|e| e.value.clone()) else {
            let error = DocumentError::new(ErrorKind::Unexpected, "extraction missing", 0);
            return self.fail(&ctx, record, error, progress);
        };

        // EXTRACTED -> PERSISTED(done)
        let _step = info_span!("persist").entered();
        progress.report(ProgressEvent::Phase {
            phase: DocumentPhase::Persisting,
            message: "Writing result".to_string(),
        });

        let degraded = ctx.is_degraded();
        let extraction_degraded = extraction.is_degraded();
        record.mark_done(classification.clone(), extraction, Utc::now());
        let report = self.persister.persist(&record, ctx.previous);

        info!(
            label = %classification.label,
            degraded,
            attempts = ctx.attempts(),
            persisted = report.persisted,
            "Document processed"
        );
        progress.report(ProgressEvent::Completed {
            label: classification.label.clone(),
            degraded,
            from_cache: false,
        });

        DocumentOutcome::done(&ctx.job, classification, extraction_degraded)
            .with_persisted(report.persisted)
    }

    /// Records a document that failed pre-validation, without running any
    /// engine. Still honours the lease so redeliveries do not double count.
    pub fn reject(
        &self,
        job: DocumentJob,
        invalid: &InvalidDocument,
        progress: &dyn ProgressReporter,
    ) -> DocumentOutcome {
        let file_name = sanitize::redact_object_name(&job.source.object_name);
        let _document_span = info_span!("document",
            batch_id = %job.batch_id,
            document_id = %job.document_id,
            file = %file_name,
        )
        .entered();

        let mut ctx = DocumentContext::new(job);
        let record = {
            let _step = info_span!("lease").entered();
            match self.claim(&mut ctx, progress) {
                Ok(record) => record,
                Err(outcome) => return outcome,
            }
        };

        self.fail(&ctx, record, invalid_document(invalid), progress)
    }

    /// Converts a worker panic into a persisted, dead-lettered failure.
    pub fn recover_from_panic(
        &self,
        job: DocumentJob,
        message: &str,
        progress: &dyn ProgressReporter,
    ) -> DocumentOutcome {
        error!(
            batch_id = %job.batch_id,
            document_id = %job.document_id,
            panic = message,
            "Document worker panicked"
        );

        let now = Utc::now();
        let stored = self
            .store
            .get_document(&job.batch_id, &job.document_id)
            .ok()
            .flatten();

        let (record, previous) = match stored {
            Some(existing) if existing.status == DocumentStatus::Done => {
                // The result was written before the panic.
                return DocumentOutcome::done(
                    &job,
                    existing
                        .classification
                        .unwrap_or_else(|| crate::model::Classification::unknown("error")),
                    existing.extraction.is_some_and(|e| e.is_degraded()),
                );
            }
            Some(existing) => {
                let previous = existing.counted_status();
                (existing, Some(previous))
            }
            None => (
                DocumentRecord::leased(&job.document_id, &job.batch_id, job.source.clone(), now),
                None,
            ),
        };

        let mut ctx = DocumentContext::new(job);
        ctx.previous = previous;
        let error = DocumentError::new(ErrorKind::Unexpected, format!("worker panicked: {}", message), 1);
        self.fail(&ctx, record, error, progress)
    }

    /// Acquires the lease. `Err` carries the final outcome when the document
    /// must not be processed by this worker.
    fn claim(
        &self,
        ctx: &mut DocumentContext,
        progress: &dyn ProgressReporter,
    ) -> Result<DocumentRecord, DocumentOutcome> {
        progress.report(ProgressEvent::Phase {
            phase: DocumentPhase::Leasing,
            message: "Acquiring lease".to_string(),
        });

        let job = &ctx.job;
        match self
            .lease
            .try_acquire(&job.batch_id, &job.document_id, &job.source)
        {
            LeaseDecision::Acquired {
                record, previous, ..
            } => {
                ctx.previous = previous;
                Ok(record)
            }
            LeaseDecision::FailOpen { record, .. } => Ok(record),
            LeaseDecision::Cached(record) => {
                let label = record
                    .classification
                    .as_ref()
                    .map(|c| c.label.clone())
                    .unwrap_or_default();
                let extraction_degraded =
                    record.extraction.as_ref().is_some_and(|e| e.is_degraded());
                progress.report(ProgressEvent::Completed {
                    label,
                    degraded: extraction_degraded,
                    from_cache: true,
                });
                Err(DocumentOutcome::cached(
                    job,
                    record.classification,
                    extraction_degraded,
                ))
            }
            LeaseDecision::ProcessingElsewhere { .. } => {
                progress.report(ProgressEvent::Skipped {
                    message: "Document is being processed by another worker".to_string(),
                });
                Err(DocumentOutcome::skipped(job))
            }
        }
    }

    /// Persists a failed record and routes it to the dead letter.
    fn fail(
        &self,
        ctx: &DocumentContext,
        mut record: DocumentRecord,
        error: DocumentError,
        progress: &dyn ProgressReporter,
    ) -> DocumentOutcome {
        let phase = match error.kind {
            ErrorKind::InvalidDocument => DocumentPhase::Rejected,
            _ => DocumentPhase::Failed,
        };
        warn!(
            error_kind = %error.kind,
            attempts = error.attempts,
            error = %error.message,
            "Document failed"
        );

        record.mark_failed(error.clone(), Utc::now());
        let report = {
            let _step = info_span!("persist").entered();
            self.persister.persist(&record, ctx.previous)
        };

        self.dead_letter.route(
            &ctx.job.batch_id,
            &ctx.job.source,
            error.kind,
            &error.message,
            error.attempts,
        );

        progress.report(ProgressEvent::Failed {
            phase,
            error: error.message.clone(),
        });

        DocumentOutcome::failed(&ctx.job, error).with_persisted(report.persisted)
    }
}

fn invalid_document(invalid: &InvalidDocument) -> DocumentError {
    DocumentError::new(ErrorKind::InvalidDocument, invalid.to_string(), 1)
}
