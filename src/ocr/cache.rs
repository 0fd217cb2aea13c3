//! Extracted-text cache keyed by file identity.
//!
//! The key folds the absolute path, size, and mtime, so an edited file never
//! serves a stale entry. Entries are plain `.txt` files; anything unreadable
//! is treated as a miss and overwritten.

use std::path::{Path, PathBuf};

/// On-disk cache of extraction results.
#[derive(Debug, Clone)]
pub struct TextCache {
    dir: PathBuf,
}

impl TextCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, source: &Path) -> Option<PathBuf> {
        let meta = std::fs::metadata(source).ok()?;
        let mtime = meta
            .modified()
            .ok()?
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();
        let absolute = source
            .canonicalize()
            .unwrap_or_else(|_| source.to_path_buf());
        let key = format!("{}|{}|{}", absolute.display(), meta.len(), mtime);
        let digest = blake3::hash(key.as_bytes()).to_hex();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        Some(self.dir.join(format!("{}.{}.txt", stem, &digest.as_str()[..16])))
    }

    /// Cached text for `source`, if an entry matches its current identity.
    pub fn get(&self, source: &Path) -> Option<String> {
        let entry = self.entry_path(source)?;
        std::fs::read_to_string(entry).ok()
    }

    /// Write through an extraction result. Failures only log; caching is
    /// best-effort.
    pub fn put(&self, source: &Path, text: &str) {
        let Some(entry) = self.entry_path(source) else {
            return;
        };
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!("缓存目录创建失败 {}: {}", self.dir.display(), err);
            return;
        }
        if let Err(err) = std::fs::write(&entry, text) {
            tracing::warn!("缓存写入失败 {}: {}", entry.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TextCache::new(dir.path().join("cache"));
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"bytes").unwrap();

        assert!(cache.get(&source).is_none());
        cache.put(&source, "提取的文本");
        assert_eq!(cache.get(&source).as_deref(), Some("提取的文本"));
    }

    #[test]
    fn test_changed_file_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TextCache::new(dir.path().join("cache"));
        let source = dir.path().join("a.docx");
        std::fs::write(&source, b"one").unwrap();
        cache.put(&source, "旧内容");

        // Same path, different size → different identity key.
        std::fs::write(&source, b"longer content").unwrap();
        assert!(cache.get(&source).is_none());
    }

    #[test]
    fn test_missing_source_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TextCache::new(dir.path().join("cache"));
        assert!(cache.get(Path::new("no/such/file.pdf")).is_none());
    }
}
