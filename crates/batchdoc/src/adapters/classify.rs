use std::sync::Arc;

use tracing::{debug, warn};

use super::{AdapterCall, AdapterError, AdapterFailure, Classifier};
use crate::model::{Classification, DocumentRef};
use crate::retry::{RetryError, RetryPolicy};

/// Classifier version recorded when the label had to be substituted.
pub const DEGRADED_CLASSIFIER_VERSION: &str = "error";

pub struct ClassificationAdapter {
    classifier: Arc<dyn Classifier>,
    retry: RetryPolicy,
}

impl ClassificationAdapter {
    pub fn new(classifier: Arc<dyn Classifier>, retry: RetryPolicy) -> Self {
        Self { classifier, retry }
    }

    /// Classifies with retries. Exhausted transient failures and empty labels
    /// degrade to `UNKNOWN`; only permanent errors are returned.
    pub fn classify(
        &self,
        document: &DocumentRef,
    ) -> Result<AdapterCall<Classification>, AdapterFailure> {
        let mut attempts = 0;
        let result = self.retry.execute_if(
            |_| {
                attempts += 1;
                self.classifier.classify(document)
            },
            AdapterError::is_transient,
        );

        match result {
            Ok(classification) if classification.label.trim().is_empty() => {
                warn!(attempts, "Classifier returned an empty label, using UNKNOWN");
                Ok(AdapterCall {
                    value: Classification::unknown(&classification.classifier_version),
                    attempts,
                    degraded: Some("empty label".to_string()),
                })
            }
            Ok(classification) => {
                debug!(
                    label = %classification.label,
                    confidence = classification.confidence,
                    attempts,
                    "Classified document"
                );
                Ok(AdapterCall {
                    value: classification,
                    attempts,
                    degraded: None,
                })
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "Classifier unavailable, using UNKNOWN");
                Ok(AdapterCall {
                    value: Classification::unknown(DEGRADED_CLASSIFIER_VERSION),
                    attempts,
                    degraded: Some(last.to_string()),
                })
            }
            Err(RetryError::Aborted { attempts, source }) => Err(AdapterFailure {
                stage: "classification",
                attempts,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Scripted {
        failures_before_success: u32,
        error: AdapterError,
        label: &'static str,
        calls: AtomicU32,
    }

    impl Classifier for Scripted {
        fn classify(&self, _document: &DocumentRef) -> Result<Classification, AdapterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(self.error.clone());
            }
            Ok(Classification::new(self.label, 0.9, "clf-1"))
        }
    }

    fn adapter(failures: u32, error: AdapterError, label: &'static str) -> (Arc<Scripted>, ClassificationAdapter) {
        let classifier = Arc::new(Scripted {
            failures_before_success: failures,
            error,
            label,
            calls: AtomicU32::new(0),
        });
        let retry = RetryPolicy::new(3, Duration::from_millis(1), 2.0, Duration::from_millis(4));
        let adapter = ClassificationAdapter::new(classifier.clone(), retry);
        (classifier, adapter)
    }

    fn doc() -> DocumentRef {
        DocumentRef::new("inbox", "folio/a.pdf", Some("1"))
    }

    #[test]
    fn test_recovers_within_budget() {
        let (classifier, adapter) =
            adapter(2, AdapterError::Transient("timeout".into()), "BANK_STATEMENT");
        let call = adapter.classify(&doc()).unwrap();
        assert_eq!(call.value.label, "BANK_STATEMENT");
        assert_eq!(call.attempts, 3);
        assert!(!call.is_degraded());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_exhausted_degrades_to_unknown() {
        let (_classifier, adapter) =
            adapter(10, AdapterError::Transient("503".into()), "BANK_STATEMENT");
        let call = adapter.classify(&doc()).unwrap();
        assert!(call.value.is_unknown());
        assert!(call.value.degraded);
        assert_eq!(call.value.classifier_version, DEGRADED_CLASSIFIER_VERSION);
        assert_eq!(call.attempts, 3);
    }

    #[test]
    fn test_empty_label_is_unknown_without_retry() {
        let (classifier, adapter) = adapter(0, AdapterError::Transient("unused".into()), "  ");
        let call = adapter.classify(&doc()).unwrap();
        assert!(call.value.is_unknown());
        assert_eq!(call.attempts, 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_permanent_error_is_returned() {
        let (classifier, adapter) =
            adapter(10, AdapterError::Permanent("unsupported".into()), "X");
        let failure = adapter.classify(&doc()).unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(failure.stage, "classification");
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }
}
