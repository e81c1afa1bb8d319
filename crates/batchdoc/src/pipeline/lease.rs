//! Per-document idempotency and lease handling.
//!
//! The document record is the only concurrency primitive: a worker may run
//! the engines for a document only after it created the record or reclaimed
//! a stale lease on it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::model::{DocumentRecord, DocumentRef, DocumentStatus};
use crate::store::DocumentStore;

#[derive(Debug, Clone)]
pub enum LeaseDecision {
    /// This worker holds the lease. `previous` is the status found before
    /// the claim, used to correct counters on a re-run.
    Acquired {
        record: DocumentRecord,
        previous: Option<DocumentStatus>,
        reclaimed: bool,
    },
    /// The store could not be consulted; processing proceeds anyway.
    FailOpen {
        record: DocumentRecord,
        reason: String,
    },
    /// Already done; the stored record is the result.
    Cached(DocumentRecord),
    /// Another worker holds a fresh lease.
    ProcessingElsewhere { leased_at: Option<DateTime<Utc>> },
}

impl LeaseDecision {
    pub fn must_process(&self) -> bool {
        matches!(
            self,
            LeaseDecision::Acquired { .. } | LeaseDecision::FailOpen { .. }
        )
    }

    pub fn cached(&self) -> Option<&DocumentRecord> {
        match self {
            LeaseDecision::Cached(record) => Some(record),
            _ => None,
        }
    }
}

pub struct LeaseManager {
    store: Arc<dyn DocumentStore>,
    stale_after: Duration,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn DocumentStore>, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    pub fn try_acquire(
        &self,
        batch_id: &str,
        document_id: &str,
        source: &DocumentRef,
    ) -> LeaseDecision {
        self.try_acquire_at(batch_id, document_id, source, Utc::now())
    }

    pub fn try_acquire_at(
        &self,
        batch_id: &str,
        document_id: &str,
        source: &DocumentRef,
        now: DateTime<Utc>,
    ) -> LeaseDecision {
        let fresh = DocumentRecord::leased(document_id, batch_id, source.clone(), now);

        let existing = match self.store.get_document(batch_id, document_id) {
            Ok(existing) => existing,
            Err(e) => return self.fail_open(fresh, e.to_string()),
        };

        let Some(existing) = existing else {
            return match self.store.create_document(&fresh) {
                Ok(true) => {
                    debug!("Lease acquired on new document");
                    LeaseDecision::Acquired {
                        record: fresh,
                        previous: None,
                        reclaimed: false,
                    }
                }
                Ok(false) => {
                    debug!("Lost lease race on new document");
                    LeaseDecision::ProcessingElsewhere {
                        leased_at: None,
                    }
                }
                Err(e) => self.fail_open(fresh, e.to_string()),
            };
        };

        match existing.status {
            DocumentStatus::Done => {
                debug!("Document already processed, serving stored result");
                LeaseDecision::Cached(existing)
            }
            DocumentStatus::Leased => {
                let age = existing.lease_age(now);
                match age {
                    Some(age) if age < self.stale_after => {
                        debug!(lease_age_secs = age.as_secs(), "Document leased by another worker");
                        LeaseDecision::ProcessingElsewhere {
                            leased_at: existing.leased_at,
                        }
                    }
                    _ => {
                        info!(
                            lease_age_secs = age.map(|a| a.as_secs()),
                            stale_after_secs = self.stale_after.as_secs(),
                            "Reclaiming stale lease"
                        );
                        let previous = existing.counted_status();
                        self.renew_lease(existing, now, Some(previous), true)
                    }
                }
            }
            DocumentStatus::Failed => {
                info!("Reprocessing previously failed document");
                self.renew_lease(existing, now, Some(DocumentStatus::Failed), false)
            }
        }
    }

    fn renew_lease(
        &self,
        existing: DocumentRecord,
        now: DateTime<Utc>,
        previous: Option<DocumentStatus>,
        reclaimed: bool,
    ) -> LeaseDecision {
        let mut record = existing;
        record.status = DocumentStatus::Leased;
        record.leased_at = Some(now);
        record.completed_at = None;
        record.updated_at = now;

        match self.store.merge_document(&record) {
            Ok(()) => LeaseDecision::Acquired {
                record,
                previous,
                reclaimed,
            },
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    policy = "fail_open",
                    error = %reason,
                    "Could not write lease, processing without it"
                );
                LeaseDecision::FailOpen { record, reason }
            }
        }
    }

    fn fail_open(&self, record: DocumentRecord, reason: String) -> LeaseDecision {
        warn!(
            policy = "fail_open",
            error = %reason,
            "Lease store unreachable, processing without idempotency guarantee"
        );
        LeaseDecision::FailOpen { record, reason }
    }
}
