use std::sync::Arc;

use tracing::{debug, warn};

use super::{AdapterCall, AdapterError, AdapterFailure, Extractor};
use crate::model::{DocumentRef, Extraction};
use crate::retry::{RetryError, RetryPolicy};

pub struct ExtractionAdapter {
    extractor: Arc<dyn Extractor>,
    retry: RetryPolicy,
}

impl ExtractionAdapter {
    pub fn new(extractor: Arc<dyn Extractor>, retry: RetryPolicy) -> Self {
        Self { extractor, retry }
    }

    /// Extracts with retries. An empty field map is a valid result; exhausted
    /// transient failures yield [`Extraction::fallback`].
    pub fn extract(
        &self,
        document: &DocumentRef,
        label: &str,
    ) -> Result<AdapterCall<Extraction>, AdapterFailure> {
        let mut attempts = 0;
        let result = self.retry.execute_if(
            |_| {
                attempts += 1;
                self.extractor.extract(document, label)
            },
            AdapterError::is_transient,
        );

        match result {
            Ok(extraction) => {
                debug!(
                    fields = extraction.fields.len(),
                    pages = extraction.metadata.page_count,
                    attempts,
                    "Extracted document"
                );
                Ok(AdapterCall {
                    value: extraction,
                    attempts,
                    degraded: None,
                })
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "Extractor unavailable, using fallback extraction");
                Ok(AdapterCall {
                    value: Extraction::fallback(),
                    attempts,
                    degraded: Some(last.to_string()),
                })
            }
            Err(RetryError::Aborted { attempts, source }) => Err(AdapterFailure {
                stage: "extraction",
                attempts,
                source,
            }),
        }
    }
}
