//! On-disk cache of generated plans under `<state_dir>/cache/`.
//!
//! One JSON file per response, named by a blake3 digest of the backend, model,
//! temperature and prompt. Only successful responses are stored; a missing or
//! unreadable entry is a miss.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlannerError;

const CACHE_DIR_NAME: &str = "cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedResponse {
    backend: String,
    model: String,
    temperature: f32,
    text: String,
}

/// What a cache entry is keyed on.
#[derive(Debug, Clone, Copy)]
pub struct CacheKey<'a> {
    pub backend: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    pub prompt: &'a str,
}

impl CacheKey<'_> {
    /// Hex digest naming the entry file. Each part is length-prefixed so
    /// shifting text between parts changes the digest.
    pub fn digest(&self) -> String {
        let temperature = self.temperature.to_string();
        let mut hasher = blake3::Hasher::new();
        for part in [self.backend, self.model, temperature.as_str(), self.prompt] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join(CACHE_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey<'_>) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }

    /// The cached text for `key`, if any.
    pub fn get(&self, key: &CacheKey<'_>) -> Option<String> {
        let path = self.entry_path(key);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "cannot read cache entry");
                return None;
            }
        };

        match serde_json::from_str::<CachedResponse>(&contents) {
            Ok(entry) if !entry.text.trim().is_empty() => {
                debug!(path = %path.display(), "cache hit");
                Some(entry.text)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), err = %e, "ignoring invalid cache entry");
                None
            }
        }
    }

    /// Store `text` for `key`, replacing any previous entry.
    pub fn put(&self, key: &CacheKey<'_>, text: &str) -> Result<(), PlannerError> {
        let path = self.entry_path(key);
        let write_err = |path: &Path, detail: String| PlannerError::CacheWriteFailed {
            path: path.to_path_buf(),
            detail,
        };

        fs::create_dir_all(&self.dir)
            .map_err(|e| write_err(&self.dir, format!("failed to create directory: {e}")))?;

        let entry = CachedResponse {
            backend: key.backend.to_owned(),
            model: key.model.to_owned(),
            temperature: key.temperature,
            text: text.to_owned(),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| write_err(&path, format!("serialization failed: {e}")))?;

        let tmp_path = path.with_extension("json.tmp");
        let written = (|| -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(json.as_bytes())?;
            f.flush()
        })();
        written.map_err(|e| write_err(&tmp_path, e.to_string()))?;
        fs::rename(&tmp_path, &path).map_err(|e| write_err(&path, e.to_string()))?;

        debug!(path = %path.display(), text_len = text.len(), "cache entry written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(prompt: &str) -> CacheKey<'_> {
        CacheKey {
            backend: "gemini",
            model: "gemini-2.5-flash",
            temperature: 0.5,
            prompt,
        }
    }

    #[test]
    fn miss_when_nothing_stored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path());
        assert_eq!(cache.get(&key("plan")), None);
        assert!(!cache.dir().exists());
    }

    #[test]
    fn put_then_get_returns_text() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path());

        cache.put(&key("plan"), "| Día |\n|---|\n| Lunes |").unwrap();

        assert_eq!(
            cache.get(&key("plan")).as_deref(),
            Some("| Día |\n|---|\n| Lunes |")
        );
        assert_eq!(cache.get(&key("other plan")), None);
        assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 1);
    }

    #[test]
    fn digest_depends_on_every_part() {
        let base = key("plan");
        let digests = [
            base.digest(),
            CacheKey { backend: "command", ..base }.digest(),
            CacheKey { model: "gemini-2.5-pro", ..base }.digest(),
            CacheKey { temperature: 0.7, ..base }.digest(),
            key("plan!").digest(),
        ];
        for (i, a) in digests.iter().enumerate() {
            for b in &digests[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(base.digest(), key("plan").digest());
    }

    #[test]
    fn parts_are_not_ambiguous() {
        let a = CacheKey { backend: "ab", model: "c", ..key("p") };
        let b = CacheKey { backend: "a", model: "bc", ..key("p") };
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn invalid_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path());
        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(cache.entry_path(&key("plan")), "{ not json").unwrap();

        assert_eq!(cache.get(&key("plan")), None);
    }

    #[test]
    fn put_reports_unusable_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let cache = ResponseCache::new(&blocker);
        assert!(matches!(
            cache.put(&key("plan"), "text"),
            Err(PlannerError::CacheWriteFailed { .. })
        ));
    }
}
