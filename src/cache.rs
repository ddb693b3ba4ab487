use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CompilerError;

pub const CACHE_FILE_NAME: &str = ".kc-cache.json";

/// Content hashes of the artifacts written by the previous build.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheManifest {
    pub artifacts: BTreeMap<String, String>,
}

/// Skips rewriting artifacts whose content did not change since the last
/// build, so downstream watchers only see real changes.
pub struct ArtifactCache {
    manifest_path: PathBuf,
    manifest: CacheManifest,
    pub written: usize,
    pub unchanged: usize,
}

impl ArtifactCache {
    pub fn open(out_dir: &Path) -> Self {
        let manifest_path = out_dir.join(CACHE_FILE_NAME);
        let manifest = match fs::read_to_string(&manifest_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::debug!("discarding corrupt cache manifest {:?}: {}", manifest_path, e);
                CacheManifest::default()
            }),
            Err(_) => CacheManifest::default(),
        };
        Self {
            manifest_path,
            manifest,
            written: 0,
            unchanged: 0,
        }
    }

    pub fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Write `content` to `path` unless the previous build wrote the same
    /// bytes there and the file still exists.
    pub fn write(&mut self, path: &Path, content: &str) -> Result<(), CompilerError> {
        let key = path.to_string_lossy().to_string();
        let hash = Self::compute_hash(content);

        if path.exists() && self.manifest.artifacts.get(&key) == Some(&hash) {
            self.unchanged += 1;
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CompilerError::io(&key, &e))?;
        }
        fs::write(path, content).map_err(|e| CompilerError::io(&key, &e))?;
        self.manifest.artifacts.insert(key, hash);
        self.written += 1;
        Ok(())
    }

    pub fn save(&self) -> Result<(), CompilerError> {
        let data = serde_json::to_string_pretty(&self.manifest)
            .map_err(|e| CompilerError::serialize("cache manifest", &e))?;
        let key = self.manifest_path.to_string_lossy();
        fs::write(&self.manifest_path, data).map_err(|e| CompilerError::io(&key, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kc-cache-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(ArtifactCache::compute_hash("a"), ArtifactCache::compute_hash("a"));
        assert_ne!(ArtifactCache::compute_hash("a"), ArtifactCache::compute_hash("b"));
        assert_eq!(ArtifactCache::compute_hash("").len(), 64);
    }

    #[test]
    fn test_unchanged_artifacts_are_skipped() {
        let dir = scratch_dir("skip");
        let target = dir.join("nested/page.html.ast");

        let mut cache = ArtifactCache::open(&dir);
        cache.write(&target, "{}").unwrap();
        cache.save().unwrap();
        assert_eq!(cache.written, 1);

        let mut cache = ArtifactCache::open(&dir);
        cache.write(&target, "{}").unwrap();
        assert_eq!((cache.written, cache.unchanged), (0, 1));
        cache.write(&target, "{\"a\":1}").unwrap();
        assert_eq!(cache.written, 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"a\":1}");

        let _ = fs::remove_dir_all(&dir);
    }
}
