use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, warn};
use walkdir::WalkDir;

use super::{ObjectEntry, ObjectSource, SourceError};

/// Filesystem-backed source. Each location is a directory under `root`;
/// object names are paths relative to it with `/` separators.
pub struct LocalObjectSource {
    root: PathBuf,
}

impl LocalObjectSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location_dir(&self, location: &str) -> Result<PathBuf, SourceError> {
        let location = location.trim_matches('/');
        check_relative(location)?;
        Ok(self.root.join(location))
    }

    fn object_path(&self, location: &str, name: &str) -> Result<PathBuf, SourceError> {
        check_relative(name)?;
        Ok(self.location_dir(location)?.join(name))
    }
}

/// Rejects absolute names and `..` segments so callers cannot escape the root.
fn check_relative(name: &str) -> Result<(), SourceError> {
    let escapes = Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(SourceError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn content_version(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let nanos = modified.duration_since(UNIX_EPOCH).ok()?.as_nanos();
    Some(nanos.to_string())
}

fn io_error(name: &str, source: std::io::Error) -> SourceError {
    if source.kind() == std::io::ErrorKind::NotFound {
        SourceError::NotFound(name.to_string())
    } else {
        SourceError::Io {
            name: name.to_string(),
            source,
        }
    }
}

impl ObjectSource for LocalObjectSource {
    fn list_objects(
        &self,
        location: &str,
        prefix: &str,
        max_items: usize,
    ) -> Result<Vec<ObjectEntry>, SourceError> {
        let base = self.location_dir(location)?;
        if !base.is_dir() {
            return Err(SourceError::NotFound(location.to_string()));
        }

        // Walk only the folder the prefix points into; the folder itself is
        // not an object under the prefix.
        let folder = prefix.rfind('/').map_or("", |i| &prefix[..i]);
        check_relative(folder)?;
        let start = base.join(folder);
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();

        for entry in WalkDir::new(&start)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", base.display(), e);
                    continue;
                }
            };

            let Ok(relative) = entry.path().strip_prefix(&base) else {
                continue;
            };
            let mut name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if entry.file_type().is_dir() {
                name.push('/');
            }

            if !name.starts_with(prefix) {
                continue;
            }

            // Directories are reported as placeholders, the way object stores
            // surface empty "folders".
            let version = if entry.file_type().is_dir() {
                None
            } else {
                content_version(entry.path())
            };
            entries.push(ObjectEntry::new(&name, version.as_deref()));

            if entries.len() >= max_items {
                break;
            }
        }

        debug!(
            "Listed {} objects under {}/{}",
            entries.len(),
            location,
            prefix
        );
        Ok(entries)
    }

    fn read_prefix(
        &self,
        location: &str,
        name: &str,
        len: usize,
    ) -> Result<Vec<u8>, SourceError> {
        let path = self.object_path(location, name)?;
        let file = File::open(&path).map_err(|e| io_error(name, e))?;
        let mut buf = Vec::with_capacity(len);
        file.take(len as u64)
            .read_to_end(&mut buf)
            .map_err(|e| io_error(name, e))?;
        Ok(buf)
    }

    fn read(&self, location: &str, name: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.object_path(location, name)?;
        std::fs::read(&path).map_err(|e| io_error(name, e))
    }
}
