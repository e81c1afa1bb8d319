//! Records persisted by the pipeline and exchanged with collaborators.

pub mod batch;
pub mod document;
pub mod extraction;

pub use batch::{BatchRecord, BatchStatus, CounterDelta};
pub use document::{document_id, DocumentError, DocumentRecord, DocumentRef, DocumentStatus, ErrorKind};
pub use extraction::{
    Classification, Extraction, ExtractionMetadata, ExtractionRecord, FieldValue, PositionRef,
    Vertex, EXTRACTION_SCHEMA_VERSION, FALLBACK_PROCESSOR, UNKNOWN_LABEL,
};
