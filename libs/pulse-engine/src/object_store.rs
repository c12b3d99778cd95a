use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use pulse_api::error::PipelineError;
use pulse_api::storage::ObjectStore;

/// Filesystem-backed object store. Keys use `/` separators and map straight
/// onto paths under `root`.
///
/// `put` stages the body in a temp file and renames it into place, so a
/// retried put of identical content leaves the stored object byte-identical
/// and readers never observe a half-written body.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PipelineError> {
        // Keys are internal (archive/quarantine writers build them), but a
        // traversal segment would silently escape the root.
        if key.split('/').any(|seg| seg == "..") {
            return Err(PipelineError::io(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(key))
    }

    fn do_put(&self, key: &str, body: &[u8]) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::io(format!("mkdir: {e}")))?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| PipelineError::io(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| PipelineError::io(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    fn do_get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::io(format!("read {}: {e}", path.display()))),
        }
    }

    fn do_list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let mut keys = Vec::new();
        collect_keys(&self.root, &self.root, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        Ok(keys)
    }
}

fn collect_keys(root: &Path, dir: &Path, keys: &mut Vec<String>) -> Result<(), PipelineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(PipelineError::io(format!("read_dir {}: {e}", dir.display()))),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_keys(root, &path, keys)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            keys.push(key);
        }
    }
    Ok(())
}

impl ObjectStore for FsObjectStore {
    fn put(
        &self,
        key: &str,
        body: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + '_>> {
        let key = key.to_string();
        let body = body.to_vec();
        Box::pin(async move { self.do_put(&key, &body) })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, PipelineError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move { self.do_get(&key) })
    }

    fn list(
        &self,
        prefix: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, PipelineError>> + Send + '_>> {
        let prefix = prefix.to_string();
        Box::pin(async move { self.do_list(&prefix) })
    }
}
