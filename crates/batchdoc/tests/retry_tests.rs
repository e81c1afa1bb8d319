//! Retry bounds and degradation paths around the engines.

mod common;

use batchdoc::model::{DocumentStatus, FALLBACK_PROCESSOR, UNKNOWN_LABEL};
use batchdoc::orchestrator::ResponseStatus;
use batchdoc::{DocumentStore, OutcomeStatus};

use common::{ScriptedClassifier, ScriptedExtractor, SettingsBuilder, TestHarness};

fn harness(classifier: ScriptedClassifier, extractor: ScriptedExtractor) -> TestHarness {
    TestHarness::with(SettingsBuilder::new().max_attempts(3).build(), classifier, extractor)
}

#[test]
fn test_transient_failures_below_limit_are_retried() {
    let harness = harness(
        ScriptedClassifier::new().failing_transiently(2),
        ScriptedExtractor::new(),
    );
    let version = harness.put_pdf("folio/statement.pdf");

    let response = harness.trigger("folio/");
    assert_eq!(response.body.status, ResponseStatus::Done);

    let result = &response.body.results.unwrap()[0];
    let classification = result.classification.as_ref().unwrap();
    assert_eq!(classification.label, "BANK_STATEMENT");
    assert!(!classification.is_unknown());
    assert_eq!(harness.classifier.calls(), 3);

    let document = harness.document("folio", "folio/statement.pdf", &version);
    assert_eq!(document.status, DocumentStatus::Done);
    assert!(harness.dead_letters().is_empty());
}

#[test]
fn test_exhausted_classifier_degrades_to_unknown() {
    let harness = harness(
        ScriptedClassifier::new().failing_transiently(3),
        ScriptedExtractor::new(),
    );
    let version = harness.put_pdf("folio/statement.pdf");

    let response = harness.trigger("folio/");
    assert_eq!(response.body.status, ResponseStatus::Done);

    let result = &response.body.results.unwrap()[0];
    assert_eq!(result.status, OutcomeStatus::Done);
    assert_eq!(result.classification.as_ref().unwrap().label, UNKNOWN_LABEL);
    assert_eq!(harness.classifier.calls(), 3);

    // Degraded documents still reach extraction and are never dead-lettered.
    assert_eq!(harness.extractor.calls(), 1);
    assert!(harness.dead_letters().is_empty());

    let document = harness.document("folio", "folio/statement.pdf", &version);
    assert_eq!(document.status, DocumentStatus::Done);
    assert!(document.classification.unwrap().is_unknown());
}

#[test]
fn test_exhausted_extractor_stores_fallback_extraction() {
    let harness = harness(ScriptedClassifier::new(), ScriptedExtractor::new().always_transient());
    let version = harness.put_pdf("folio/statement.pdf");

    let response = harness.trigger("folio/");
    assert_eq!(response.body.status, ResponseStatus::Done);

    let result = &response.body.results.unwrap()[0];
    assert!(result.extraction_degraded);
    assert_eq!(harness.extractor.calls(), 3);

    let document = harness.document("folio", "folio/statement.pdf", &version);
    let extraction = document.extraction.unwrap();
    assert!(extraction.fields.is_empty());
    assert!(extraction.metadata.degraded);
    assert_eq!(extraction.metadata.processor_version, FALLBACK_PROCESSOR);

    // Empty extractions are not appended to the history.
    assert!(harness
        .store
        .list_extractions("folio", &document.id)
        .unwrap()
        .is_empty());
    assert!(harness.dead_letters().is_empty());
}

#[test]
fn test_empty_label_is_not_retried() {
    let harness = harness(
        ScriptedClassifier::new().empty_label_for("blank.pdf"),
        ScriptedExtractor::new(),
    );
    harness.put_pdf("folio/blank.pdf");

    let response = harness.trigger("folio/");
    let result = &response.body.results.unwrap()[0];

    assert_eq!(result.status, OutcomeStatus::Done);
    assert_eq!(result.classification.as_ref().unwrap().label, UNKNOWN_LABEL);
    assert_eq!(harness.classifier.calls_for("blank.pdf"), 1);
}

#[test]
fn test_successful_extraction_is_appended_to_history() {
    let harness = harness(ScriptedClassifier::new(), ScriptedExtractor::new());
    let version = harness.put_pdf("folio/invoice-7.pdf");

    harness.trigger("folio/");

    let document = harness.document("folio", "folio/invoice-7.pdf", &version);
    let history = harness
        .store
        .list_extractions("folio", &document.id)
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].extraction.fields["document_label"].value,
        "INVOICE"
    );
}
