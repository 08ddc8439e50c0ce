//! In-memory result cache keyed by quality level.
//!
//! Each entry pairs the computed payload with a revocable preview handle
//! backed by a file on disk. Handle revocation is tied to ownership: a
//! handle deletes its preview file when dropped, so overwriting an entry or
//! clearing the cache can never leak a preview resource, even on early
//! returns or error paths.

use crate::quality::QualityLevel;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Revocable reference to a materialized preview resource.
///
/// Deletion of the backing file is guaranteed on drop.
#[derive(Debug)]
pub struct PreviewHandle {
    path: PathBuf,
}

impl PreviewHandle {
    /// Write `payload` to a fresh preview file under `dir` and return the
    /// handle owning it.
    pub fn materialize(dir: &Path, level: QualityLevel, payload: &[u8]) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}-{}.pdf", level, Uuid::new_v4()));
        fs::write(&path, payload)?;
        Ok(Self { path })
    }

    /// Path of the backing preview file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revoke the handle, deleting the preview file now.
    pub fn revoke(self) {
        // Drop does the work.
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        // Best-effort deletion of the backing file.
        let _ = fs::remove_file(&self.path);
    }
}

/// A cached compression result for one quality level.
#[derive(Debug)]
pub struct CacheEntry {
    payload: Arc<Vec<u8>>,
    handle: PreviewHandle,
}

impl CacheEntry {
    pub fn payload(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.payload)
    }

    pub fn bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn preview_path(&self) -> &Path {
        self.handle.path()
    }
}

/// In-memory mapping from quality level to computed result.
///
/// At most one entry per level. No eviction policy: entries live exactly as
/// long as the current document.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<QualityLevel, CacheEntry>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, level: QualityLevel) -> bool {
        self.entries.contains_key(&level)
    }

    pub fn get(&self, level: QualityLevel) -> Option<&CacheEntry> {
        self.entries.get(&level)
    }

    /// Insert a result for `level`, replacing any existing entry.
    ///
    /// The replaced entry's preview handle is revoked before this returns.
    pub fn insert(&mut self, level: QualityLevel, payload: Arc<Vec<u8>>, handle: PreviewHandle) {
        if let Some(old) = self.entries.insert(level, CacheEntry { payload, handle }) {
            old.handle.revoke();
        }
    }

    /// Remove every entry, revoking all preview handles.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.revoke();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size in bytes of the cached payload for `level`, if present.
    pub fn size_of(&self, level: QualityLevel) -> Option<u64> {
        self.entries.get(&level).map(|e| e.bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn materialize(dir: &Path, level: QualityLevel, payload: &[u8]) -> PreviewHandle {
        PreviewHandle::materialize(dir, level, payload).expect("materialize preview")
    }

    #[test]
    fn test_materialize_writes_payload() {
        let dir = TempDir::new().unwrap();
        let handle = materialize(dir.path(), QualityLevel::Screen, b"payload");

        assert!(handle.path().exists());
        assert_eq!(fs::read(handle.path()).unwrap(), b"payload");
    }

    #[test]
    fn test_revoke_deletes_preview_file() {
        let dir = TempDir::new().unwrap();
        let handle = materialize(dir.path(), QualityLevel::Screen, b"payload");
        let path = handle.path().to_path_buf();

        handle.revoke();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_deletes_preview_file() {
        let dir = TempDir::new().unwrap();
        let path;
        {
            let handle = materialize(dir.path(), QualityLevel::Ebook, b"payload");
            path = handle.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_insert_then_get_returns_identical_payload() {
        let dir = TempDir::new().unwrap();
        let mut cache = ResultCache::new();
        let payload = Arc::new(b"result bytes".to_vec());

        cache.insert(
            QualityLevel::Ebook,
            Arc::clone(&payload),
            materialize(dir.path(), QualityLevel::Ebook, &payload),
        );

        let entry = cache.get(QualityLevel::Ebook).unwrap();
        assert!(Arc::ptr_eq(&entry.payload(), &payload));
        assert_eq!(entry.bytes(), payload.len() as u64);
        assert!(cache.has(QualityLevel::Ebook));
        assert_eq!(cache.size_of(QualityLevel::Ebook), Some(12));
    }

    #[test]
    fn test_overwrite_revokes_replaced_handle() {
        let dir = TempDir::new().unwrap();
        let mut cache = ResultCache::new();

        let first = materialize(dir.path(), QualityLevel::Screen, b"first");
        let first_path = first.path().to_path_buf();
        cache.insert(QualityLevel::Screen, Arc::new(b"first".to_vec()), first);

        let second = materialize(dir.path(), QualityLevel::Screen, b"second");
        let second_path = second.path().to_path_buf();
        cache.insert(QualityLevel::Screen, Arc::new(b"second".to_vec()), second);

        assert!(!first_path.exists());
        assert!(second_path.exists());
        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get(QualityLevel::Screen).unwrap().payload(), b"second".to_vec());
    }

    #[test]
    fn test_clear_revokes_every_handle() {
        let dir = TempDir::new().unwrap();
        let mut cache = ResultCache::new();
        let mut paths = Vec::new();

        for &level in &[QualityLevel::Screen, QualityLevel::Ebook, QualityLevel::Printer] {
            let handle = materialize(dir.path(), level, level.as_str().as_bytes());
            paths.push(handle.path().to_path_buf());
            cache.insert(level, Arc::new(level.as_str().as_bytes().to_vec()), handle);
        }

        assert_eq!(cache.len(), 3);
        cache.clear();

        assert!(cache.is_empty());
        for path in paths {
            assert!(!path.exists(), "preview file {} survived clear", path.display());
        }
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = ResultCache::new();
        assert!(!cache.has(QualityLevel::Prepress));
        assert!(cache.get(QualityLevel::Prepress).is_none());
        assert_eq!(cache.size_of(QualityLevel::Prepress), None);
    }
}
