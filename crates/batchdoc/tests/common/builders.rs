//! Builders for settings, fixtures and scripted engine fakes.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use lopdf::{dictionary, Document, Object, Stream};

use batchdoc::config::{PipelineSettings, StructuralCheck};
use batchdoc::model::{Classification, DocumentRef, Extraction, ExtractionMetadata, FieldValue};
use batchdoc::{AdapterError, Classifier, Extractor, PipelineConfig};

/// Builds a well-formed PDF with `pages` pages.
pub fn pdf_bytes(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            let content = format!("BT /F1 12 Tf 50 742 Td (page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Object::Stream(Stream::new(
                dictionary! {},
                content.into_bytes(),
            )));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
            });
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize PDF");
    bytes
}

/// Bytes that fail the header check.
pub fn corrupt_bytes() -> Vec<u8> {
    b"PK\x03\x04 this is a zip, not a statement".to_vec()
}

/// Builder for `PipelineSettings` with test-friendly retry delays.
pub struct SettingsBuilder {
    settings: PipelineSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        let mut settings = PipelineSettings::default();
        settings.retry.initial_delay_secs = 0.001;
        settings.retry.max_delay_secs = 0.004;
        settings.batch_timeout_secs = 30;
        Self { settings }
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.settings.max_concurrency = n;
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.settings.max_items = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.settings.retry.max_attempts = n;
        self
    }

    pub fn stale_after_secs(mut self, secs: u64) -> Self {
        self.settings.lease.stale_after_secs = secs;
        self
    }

    pub fn structural_check(mut self, check: StructuralCheck) -> Self {
        self.settings.validation.structural_check = check;
        self
    }

    pub fn settings(self) -> PipelineSettings {
        self.settings
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig::from_settings(&self.settings).expect("test settings are valid")
    }
}

fn base_name(document: &DocumentRef) -> &str {
    document
        .object_name
        .rsplit('/')
        .next()
        .unwrap_or(&document.object_name)
}

/// Classifier fake driven by per-document scripts.
#[derive(Default)]
pub struct ScriptedClassifier {
    transient_failures: u32,
    permanent: HashSet<String>,
    empty_label: HashSet<String>,
    delay: Duration,
    calls: Mutex<HashMap<String, u32>>,
    total: AtomicU32,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document fails transiently `n` times before succeeding.
    pub fn failing_transiently(mut self, n: u32) -> Self {
        self.transient_failures = n;
        self
    }

    pub fn failing_permanently_for(mut self, base_name: &str) -> Self {
        self.permanent.insert(base_name.to_string());
        self
    }

    pub fn empty_label_for(mut self, base_name: &str) -> Self {
        self.empty_label.insert(base_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, base_name: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(base_name)
            .copied()
            .unwrap_or(0)
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&self, document: &DocumentRef) -> Result<Classification, AdapterError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let name = base_name(document).to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if self.permanent.contains(&name) {
            return Err(AdapterError::Permanent(format!("cannot classify {}", name)));
        }
        if call <= self.transient_failures {
            return Err(AdapterError::Transient("classifier returned 503".to_string()));
        }
        if self.empty_label.contains(&name) {
            return Ok(Classification::new("", 0.0, "clf-test"));
        }

        let label = if name.contains("invoice") {
            "INVOICE"
        } else {
            "BANK_STATEMENT"
        };
        Ok(Classification::new(label, 0.875, "clf-test"))
    }
}

/// Extractor fake returning one field named after the label.
#[derive(Default)]
pub struct ScriptedExtractor {
    always_transient: bool,
    total: AtomicU32,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_transient(mut self) -> Self {
        self.always_transient = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.total.load(Ordering::SeqCst)
    }
}

impl Extractor for ScriptedExtractor {
    fn extract(&self, _document: &DocumentRef, label: &str) -> Result<Extraction, AdapterError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        if self.always_transient {
            return Err(AdapterError::Transient("extractor timed out".to_string()));
        }

        let mut fields = BTreeMap::new();
        fields.insert(
            "document_label".to_string(),
            FieldValue {
                value: label.to_string(),
                confidence: 0.75,
                position_refs: vec![],
            },
        );
        Ok(Extraction {
            fields,
            metadata: ExtractionMetadata {
                page_count: 1,
                processor_version: "proc-test".to_string(),
                schema_version: "v1.0".to_string(),
                degraded: false,
            },
        })
    }
}
