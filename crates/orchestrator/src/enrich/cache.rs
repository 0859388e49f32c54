use crate::enrich::provider::Verdict;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Content-addressed cache of classifier verdicts, one JSON file per key.
///
/// The key is a pure function of `(code_snippet, finding_type)`, so entries
/// never need invalidation: the same inputs always mean the same verdict.
/// This directory is the only durable artifact the orchestrator writes.
pub struct EnrichmentCache {
    dir: PathBuf,
}

impl EnrichmentCache {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// First 16 hex chars of sha256("snippet:finding_type").
    pub fn key(code_snippet: &str, finding_type: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(code_snippet.as_bytes());
        hasher.update(b":");
        hasher.update(finding_type.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..16].to_string()
    }

    pub fn get(&self, key: &str) -> Option<Verdict> {
        let path = self.entry_path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(verdict) => {
                debug!(key, "enrichment cache hit");
                Some(verdict)
            }
            Err(e) => {
                // A corrupt entry is treated as a miss and overwritten on
                // the next put.
                warn!(key, error = %e, "discarding corrupt cache entry");
                None
            }
        }
    }

    /// Best-effort write; a full disk should not fail the scan.
    pub fn put(&self, key: &str, verdict: &Verdict) {
        let path = self.entry_path(key);
        let json = match serde_json::to_string(verdict) {
            Ok(json) => json,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, json) {
            warn!(key, error = %e, "failed to write cache entry");
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> (tempfile::TempDir, EnrichmentCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = EnrichmentCache::new(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_key_is_deterministic_and_input_sensitive() {
        let a = EnrichmentCache::key("let x = query(input);", "sql-injection");
        let b = EnrichmentCache::key("let x = query(input);", "sql-injection");
        let c = EnrichmentCache::key("let x = query(input);", "xss");
        let d = EnrichmentCache::key("let y = 1;", "sql-injection");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_miss_then_hit_round_trip() {
        let (_dir, cache) = cache();
        let key = EnrichmentCache::key("snippet", "type");
        assert!(cache.get(&key).is_none());

        let verdict = Verdict {
            is_true_positive: false,
            confidence: 0.85,
            explanation: "input is validated upstream".to_string(),
            suggested_fix: None,
            severity_adjustment: Some("lower".to_string()),
        };
        cache.put(&key, &verdict);

        assert_eq!(cache.get(&key).unwrap(), verdict);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let (dir, cache) = cache();
        let key = EnrichmentCache::key("snippet", "type");
        std::fs::write(dir.path().join(format!("{key}.json")), "not json").unwrap();
        assert!(cache.get(&key).is_none());
    }
}
