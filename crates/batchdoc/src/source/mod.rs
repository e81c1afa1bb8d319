//! Object listing and reading.
//!
//! A location is the equivalent of a bucket; object names are `/`-separated
//! keys inside it.

pub mod local;
pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use local::LocalObjectSource;
pub use memory::MemoryObjectSource;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_version: Option<String>,
}

impl ObjectEntry {
    pub fn new(name: &str, content_version: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            content_version: content_version.map(|v| v.to_string()),
        }
    }

    /// Placeholder objects some stores create for "folders".
    pub fn is_directory_placeholder(&self) -> bool {
        self.name.ends_with('/')
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error for object '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid object name: {0}")]
    InvalidName(String),
}

/// Blocking access to stored objects.
pub trait ObjectSource: Send + Sync {
    /// Lists up to `max_items` objects whose names start with `prefix`, in
    /// lexicographic order.
    fn list_objects(
        &self,
        location: &str,
        prefix: &str,
        max_items: usize,
    ) -> Result<Vec<ObjectEntry>, SourceError>;

    /// Reads at most `len` leading bytes of an object.
    fn read_prefix(&self, location: &str, name: &str, len: usize)
        -> Result<Vec<u8>, SourceError>;

    fn read(&self, location: &str, name: &str) -> Result<Vec<u8>, SourceError>;
}
