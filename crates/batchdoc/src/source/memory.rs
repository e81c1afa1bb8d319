use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use super::{ObjectEntry, ObjectSource, SourceError};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    version: String,
}

/// Object source backed by in-process maps, keyed by location then name.
#[derive(Debug, Default)]
pub struct MemoryObjectSource {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
    next_version: AtomicU64,
    listing_unavailable: AtomicBool,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object and returns its generated content version. Writing
    /// the same name again produces a new version.
    pub fn put(&self, location: &str, name: &str, bytes: impl Into<Vec<u8>>) -> String {
        let version = (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        self.put_with_version(location, name, bytes, &version);
        version
    }

    pub fn put_with_version(
        &self,
        location: &str,
        name: &str,
        bytes: impl Into<Vec<u8>>,
        version: &str,
    ) {
        let mut objects = match self.objects.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        objects.insert(
            (location.to_string(), name.to_string()),
            StoredObject {
                bytes: bytes.into(),
                version: version.to_string(),
            },
        );
    }

    /// Makes subsequent `list_objects` calls fail.
    pub fn set_listing_unavailable(&self, unavailable: bool) {
        self.listing_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn get(&self, location: &str, name: &str) -> Result<StoredObject, SourceError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| SourceError::Unavailable("object map lock poisoned".to_string()))?;
        objects
            .get(&(location.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", location, name)))
    }
}

impl ObjectSource for MemoryObjectSource {
    fn list_objects(
        &self,
        location: &str,
        prefix: &str,
        max_items: usize,
    ) -> Result<Vec<ObjectEntry>, SourceError> {
        if self.listing_unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable(format!(
                "listing disabled for {}",
                location
            )));
        }

        let objects = self
            .objects
            .read()
            .map_err(|_| SourceError::Unavailable("object map lock poisoned".to_string()))?;

        Ok(objects
            .iter()
            .filter(|((loc, name), _)| loc == location && name.starts_with(prefix))
            .take(max_items)
            .map(|((_, name), obj)| ObjectEntry::new(name, Some(&obj.version)))
            .collect())
    }

    fn read_prefix(
        &self,
        location: &str,
        name: &str,
        len: usize,
    ) -> Result<Vec<u8>, SourceError> {
        let mut bytes = self.get(location, name)?.bytes;
        bytes.truncate(len);
        Ok(bytes)
    }

    fn read(&self, location: &str, name: &str) -> Result<Vec<u8>, SourceError> {
        Ok(self.get(location, name)?.bytes)
    }
}
