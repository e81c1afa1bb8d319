//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` wires a `BatchOrchestrator` to an in-memory store, an
//! in-memory object source, scripted engines and a channel dead-letter
//! publisher, so each test observes every side effect directly.

#![allow(dead_code)]

use std::sync::Arc;

use batchdoc::model::{document_id, BatchRecord, DocumentRecord};
use batchdoc::orchestrator::{BatchOrchestrator, InvocationResponse, TriggerEvent};
use batchdoc::pipeline::{ChannelPublisher, DeadLetterMessage};
use batchdoc::worker::crossbeam_channel::Receiver;
use batchdoc::{DocumentStore, InMemoryStore, MemoryObjectSource, PipelineConfig};

use super::builders::{pdf_bytes, ScriptedClassifier, ScriptedExtractor, SettingsBuilder};

pub const LOCATION: &str = "inbox";

pub struct TestHarness {
    pub store: Arc<InMemoryStore>,
    pub source: Arc<MemoryObjectSource>,
    pub classifier: Arc<ScriptedClassifier>,
    pub extractor: Arc<ScriptedExtractor>,
    pub orchestrator: BatchOrchestrator,
    dead_letters: Receiver<DeadLetterMessage>,
}

impl TestHarness {
    /// Harness with default settings and well-behaved engines.
    pub fn new() -> Self {
        Self::with(
            SettingsBuilder::new().build(),
            ScriptedClassifier::new(),
            ScriptedExtractor::new(),
        )
    }

    pub fn with(
        config: PipelineConfig,
        classifier: ScriptedClassifier,
        extractor: ScriptedExtractor,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::with_store(config, classifier, extractor, store)
    }

    /// Uses the given store, as a second deployment of the pipeline would.
    pub fn with_store(
        config: PipelineConfig,
        classifier: ScriptedClassifier,
        extractor: ScriptedExtractor,
        store: Arc<InMemoryStore>,
    ) -> Self {
        Self::assemble(
            config,
            classifier,
            extractor,
            store,
            Arc::new(MemoryObjectSource::new()),
        )
    }

    /// Another orchestrator over the same store and objects, with its own
    /// engines. Simulates a concurrent redelivery of the same trigger.
    pub fn sibling(&self, classifier: ScriptedClassifier) -> Self {
        Self::assemble(
            self.orchestrator.config().clone(),
            classifier,
            ScriptedExtractor::new(),
            self.store.clone(),
            self.source.clone(),
        )
    }

    fn assemble(
        config: PipelineConfig,
        classifier: ScriptedClassifier,
        extractor: ScriptedExtractor,
        store: Arc<InMemoryStore>,
        source: Arc<MemoryObjectSource>,
    ) -> Self {
        let classifier = Arc::new(classifier);
        let extractor = Arc::new(extractor);
        let (publisher, dead_letters) = ChannelPublisher::channel();

        let orchestrator = BatchOrchestrator::new(
            config,
            store.clone(),
            source.clone(),
            classifier.clone(),
            extractor.clone(),
            Arc::new(publisher),
        );

        Self {
            store,
            source,
            classifier,
            extractor,
            orchestrator,
            dead_letters,
        }
    }

    /// Stores an object and returns its content version.
    pub fn put(&self, name: &str, bytes: Vec<u8>) -> String {
        self.source.put(LOCATION, name, bytes)
    }

    pub fn put_pdf(&self, name: &str) -> String {
        self.put(name, pdf_bytes(1))
    }

    /// Delivers the sentinel notification for `prefix` (which ends in `/`).
    pub fn trigger(&self, prefix: &str) -> InvocationResponse {
        self.orchestrator
            .handle(&TriggerEvent::new(LOCATION, &format!("{}is_ready", prefix)))
    }

    /// Dead-letter messages published since the last call.
    pub fn dead_letters(&self) -> Vec<DeadLetterMessage> {
        self.dead_letters.try_iter().collect()
    }

    pub fn batch(&self, batch_id: &str) -> BatchRecord {
        self.store
            .get_batch(batch_id)
            .expect("store reachable")
            .expect("batch exists")
    }

    pub fn document(&self, batch_id: &str, object_name: &str, version: &str) -> DocumentRecord {
        let id = self.document_id(batch_id, object_name, version);
        self.store
            .get_document(batch_id, &id)
            .expect("store reachable")
            .expect("document exists")
    }

    pub fn document_id(&self, batch_id: &str, object_name: &str, version: &str) -> String {
        document_id(batch_id, object_name, Some(version))
    }
}
