//! Structural pre-checks run before a document is admitted to the engines.

use std::sync::Arc;

use thiserror::Error;

use crate::config::StructuralCheck;
use crate::model::DocumentRef;
use crate::source::ObjectSource;

pub const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidDocument {
    #[error("missing %PDF- header (found \"{found}\")")]
    BadHeader { found: String },

    #[error("object could not be read: {0}")]
    Unreadable(String),

    #[error("PDF structure could not be parsed: {0}")]
    Unparseable(String),

    #[error("PDF has no pages")]
    NoPages,
}

pub struct DocumentValidator {
    source: Arc<dyn ObjectSource>,
    check: StructuralCheck,
}

impl DocumentValidator {
    pub fn new(source: Arc<dyn ObjectSource>, check: StructuralCheck) -> Self {
        Self { source, check }
    }

    pub fn check(&self) -> StructuralCheck {
        self.check
    }

    /// Magic-byte check only, whatever the configured depth. Cheap enough to
    /// run on the orchestrator thread before a document takes a pool slot.
    pub fn validate_header(&self, document: &DocumentRef) -> Result<(), InvalidDocument> {
        let head = self
            .source
            .read_prefix(&document.location, &document.object_name, PDF_MAGIC.len())
            .map_err(|e| InvalidDocument::Unreadable(e.to_string()))?;
        check_header(&head)
    }

    pub fn validate(&self, document: &DocumentRef) -> Result<(), InvalidDocument> {
        match self.check {
            StructuralCheck::Header => self.validate_header(document),
            StructuralCheck::Parse => {
                let bytes = self
                    .source
                    .read(&document.location, &document.object_name)
                    .map_err(|e| InvalidDocument::Unreadable(e.to_string()))?;
                check_header(&bytes)?;
                check_structure(&bytes)
            }
        }
    }
}

pub fn check_header(bytes: &[u8]) -> Result<(), InvalidDocument> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let shown = &bytes[..bytes.len().min(PDF_MAGIC.len())];
    Err(InvalidDocument::BadHeader {
        found: shown.escape_ascii().to_string(),
    })
}

fn check_structure(bytes: &[u8]) -> Result<(), InvalidDocument> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| InvalidDocument::Unparseable(e.to_string()))?;
    if doc.get_pages().is_empty() {
        return Err(InvalidDocument::NoPages);
    }
    Ok(())
}
