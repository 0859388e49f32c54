//! AI-assisted true/false-positive classification for top findings.
//!
//! A bounded subset of the highest-severity findings is sent to an external
//! reasoning provider, fronted by a content-addressed disk cache. Every
//! failure here is recovered locally: the scan completes, the affected
//! findings simply carry no enrichment.

pub mod cache;
pub mod mock_provider;
pub mod provider;

pub use cache::EnrichmentCache;
pub use mock_provider::MockEnrichmentProvider;
pub use provider::{
    EnrichmentError, EnrichmentProvider, EnrichmentRequest, OpenAiProvider, Verdict,
};

use crate::core::Finding;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snippet context handed to the classifier, in lines either side of the
/// finding.
const SNIPPET_CONTEXT_LINES: usize = 5;

/// A classification attached to one finding, plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub cache_key: String,

    pub is_true_positive: bool,

    pub confidence: f64,

    pub explanation: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggested_fix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub severity_adjustment: Option<String>,

    pub from_cache: bool,
}

impl EnrichmentRecord {
    fn from_verdict(cache_key: String, verdict: Verdict, from_cache: bool) -> Self {
        Self {
            cache_key,
            is_true_positive: verdict.is_true_positive,
            confidence: verdict.confidence,
            explanation: verdict.explanation,
            suggested_fix: verdict.suggested_fix,
            severity_adjustment: verdict.severity_adjustment,
            from_cache,
        }
    }
}

pub struct Enricher {
    provider: Arc<dyn EnrichmentProvider>,
    cache: EnrichmentCache,
    max_findings: usize,
}

impl Enricher {
    pub fn new(
        provider: Arc<dyn EnrichmentProvider>,
        cache: EnrichmentCache,
        max_findings: usize,
    ) -> Self {
        Self {
            provider,
            cache,
            max_findings,
        }
    }

    /// Enrich up to `max_findings` entries in place, invoking `on_step`
    /// after each one so the caller can report progress. Findings are
    /// expected to arrive highest severity first.
    ///
    /// Returns the number of findings that received enrichment. Provider
    /// failures are logged and skipped; they never propagate.
    pub async fn enrich<F>(&self, findings: &mut [Finding], root: &Path, on_step: F) -> usize
    where
        F: Fn(usize),
    {
        let mut enriched = 0usize;
        let limit = self.max_findings.min(findings.len());

        for (index, finding) in findings.iter_mut().take(limit).enumerate() {
            let Some(snippet) = extract_snippet(root, &finding.file, finding.line) else {
                debug!(file = %finding.file, line = finding.line, "no snippet available, skipping enrichment");
                on_step(index);
                continue;
            };

            if let Some(record) = self.classify_one(finding, snippet).await {
                finding.enrichment = Some(record);
                enriched += 1;
            }
            on_step(index);
        }

        enriched
    }

    async fn classify_one(&self, finding: &Finding, snippet: String) -> Option<EnrichmentRecord> {
        let cache_key = EnrichmentCache::key(&snippet, &finding.check_id);

        if let Some(verdict) = self.cache.get(&cache_key) {
            return Some(EnrichmentRecord::from_verdict(cache_key, verdict, true));
        }

        let request = EnrichmentRequest {
            code_snippet: snippet,
            finding_type: finding.check_id.clone(),
            file_path: finding.file.clone(),
            line: finding.line,
        };

        match self.provider.classify(request).await {
            Ok(verdict) => {
                self.cache.put(&cache_key, &verdict);
                Some(EnrichmentRecord::from_verdict(cache_key, verdict, false))
            }
            Err(e) => {
                // Non-fatal by contract: the finding keeps its original
                // severity and simply goes out unenriched.
                warn!(check_id = %finding.check_id, error = %e, "enrichment failed for finding");
                None
            }
        }
    }
}

/// Pull ±5 lines of context around the finding from the scanned tree.
/// Tool output may carry absolute paths or paths relative to the scan
/// root; both are handled.
fn extract_snippet(root: &Path, file: &str, line: usize) -> Option<String> {
    let path = {
        let p = Path::new(file);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    };

    let content = std::fs::read_to_string(path).ok()?;
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return None;
    }

    let start = line.saturating_sub(SNIPPET_CONTEXT_LINES + 1);
    let end = (line + SNIPPET_CONTEXT_LINES).min(lines.len());
    if start >= end {
        return None;
    }

    Some(lines[start..end].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    fn finding(check_id: &str, file: &str, line: usize) -> Finding {
        Finding::new(
            check_id.to_string(),
            file.to_string(),
            Severity::Critical,
            "message".to_string(),
        )
        .with_span(line, line, 1, 10)
    }

    fn write_source(dir: &Path) {
        let mut body = String::new();
        for i in 1..=20 {
            body.push_str(&format!("line {i}\n"));
        }
        std::fs::write(dir.join("app.py"), body).unwrap();
    }

    #[test]
    fn test_extract_snippet_window() {
        let dir = tempfile::tempdir().unwrap();
        write_source(dir.path());

        let snippet = extract_snippet(dir.path(), "app.py", 10).unwrap();
        let lines: Vec<&str> = snippet.lines().collect();
        assert_eq!(lines.first(), Some(&"line 5"));
        assert_eq!(lines.last(), Some(&"line 15"));
    }

    #[test]
    fn test_extract_snippet_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(extract_snippet(dir.path(), "gone.py", 3).is_none());
    }

    #[tokio::test]
    async fn test_second_identical_call_comes_from_cache() {
        let scan_dir = tempfile::tempdir().unwrap();
        write_source(scan_dir.path());
        let cache_dir = tempfile::tempdir().unwrap();

        let provider = Arc::new(MockEnrichmentProvider::new());
        let enricher = Enricher::new(
            provider.clone(),
            EnrichmentCache::new(cache_dir.path()).unwrap(),
            20,
        );

        let mut first = vec![finding("sql-injection", "app.py", 10)];
        enricher.enrich(&mut first, scan_dir.path(), |_| {}).await;
        let first_record = first[0].enrichment.clone().unwrap();
        assert!(!first_record.from_cache);
        assert_eq!(provider.call_count(), 1);

        let mut second = vec![finding("sql-injection", "app.py", 10)];
        enricher.enrich(&mut second, scan_dir.path(), |_| {}).await;
        let second_record = second[0].enrichment.clone().unwrap();
        assert!(second_record.from_cache);
        assert_eq!(provider.call_count(), 1);

        assert_eq!(first_record.cache_key, second_record.cache_key);
        assert_eq!(first_record.confidence, second_record.confidence);
        assert_eq!(first_record.explanation, second_record.explanation);
    }

    #[tokio::test]
    async fn test_differing_inputs_are_classified_independently() {
        let scan_dir = tempfile::tempdir().unwrap();
        write_source(scan_dir.path());
        let cache_dir = tempfile::tempdir().unwrap();

        let provider = Arc::new(MockEnrichmentProvider::new());
        let enricher = Enricher::new(
            provider.clone(),
            EnrichmentCache::new(cache_dir.path()).unwrap(),
            20,
        );

        let mut findings = vec![
            finding("sql-injection", "app.py", 5),
            finding("hardcoded-secret", "app.py", 15),
        ];
        enricher.enrich(&mut findings, scan_dir.path(), |_| {}).await;

        assert_eq!(provider.call_count(), 2);
        let a = findings[0].enrichment.as_ref().unwrap();
        let b = findings[1].enrichment.as_ref().unwrap();
        assert_ne!(a.cache_key, b.cache_key);
        assert!(a.is_true_positive);
        assert!(!b.is_true_positive);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_findings_unenriched() {
        let scan_dir = tempfile::tempdir().unwrap();
        write_source(scan_dir.path());
        let cache_dir = tempfile::tempdir().unwrap();

        let enricher = Enricher::new(
            Arc::new(MockEnrichmentProvider::failing()),
            EnrichmentCache::new(cache_dir.path()).unwrap(),
            20,
        );

        let mut findings = vec![finding("sql-injection", "app.py", 10)];
        let enriched = enricher.enrich(&mut findings, scan_dir.path(), |_| {}).await;

        assert_eq!(enriched, 0);
        assert!(findings[0].enrichment.is_none());
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_max_findings_bound_respected() {
        let scan_dir = tempfile::tempdir().unwrap();
        write_source(scan_dir.path());
        let cache_dir = tempfile::tempdir().unwrap();

        let provider = Arc::new(MockEnrichmentProvider::new());
        let enricher = Enricher::new(
            provider.clone(),
            EnrichmentCache::new(cache_dir.path()).unwrap(),
            2,
        );

        let mut findings = vec![
            finding("a", "app.py", 1),
            finding("b", "app.py", 5),
            finding("c", "app.py", 9),
        ];
        enricher.enrich(&mut findings, scan_dir.path(), |_| {}).await;

        assert_eq!(provider.call_count(), 2);
        assert!(findings[2].enrichment.is_none());
    }
}
