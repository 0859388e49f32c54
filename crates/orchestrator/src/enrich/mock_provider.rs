use crate::enrich::provider::{EnrichmentError, EnrichmentProvider, EnrichmentRequest, Verdict};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted classifier for tests: canned verdicts keyed by substrings of
/// the finding type, with call counting so cache behavior is observable.
pub struct MockEnrichmentProvider {
    verdicts: HashMap<String, Verdict>,
    default_verdict: Verdict,
    call_count: AtomicUsize,
    should_fail: bool,
}

impl Default for MockEnrichmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEnrichmentProvider {
    pub fn new() -> Self {
        Self {
            verdicts: Self::default_verdicts(),
            default_verdict: Verdict {
                is_true_positive: true,
                confidence: 0.7,
                explanation: "No mitigation visible in the snippet".to_string(),
                suggested_fix: None,
                severity_adjustment: None,
            },
            call_count: AtomicUsize::new(0),
            should_fail: false,
        }
    }

    pub fn failing() -> Self {
        let mut provider = Self::new();
        provider.should_fail = true;
        provider
    }

    pub fn with_verdict(mut self, pattern: &str, verdict: Verdict) -> Self {
        self.verdicts.insert(pattern.to_string(), verdict);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn default_verdicts() -> HashMap<String, Verdict> {
        let mut verdicts = HashMap::new();

        verdicts.insert(
            "sql-injection".to_string(),
            Verdict {
                is_true_positive: true,
                confidence: 0.95,
                explanation: "Query string is concatenated from request input".to_string(),
                suggested_fix: Some("Use a parameterized query".to_string()),
                severity_adjustment: Some("same".to_string()),
            },
        );

        verdicts.insert(
            "hardcoded".to_string(),
            Verdict {
                is_true_positive: false,
                confidence: 0.8,
                explanation: "Value is a test fixture, not a production credential".to_string(),
                suggested_fix: None,
                severity_adjustment: Some("lower".to_string()),
            },
        );

        verdicts
    }
}

#[async_trait]
impl EnrichmentProvider for MockEnrichmentProvider {
    async fn classify(&self, request: EnrichmentRequest) -> Result<Verdict, EnrichmentError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(EnrichmentError::Api(
                "mock provider configured to fail".to_string(),
            ));
        }

        for (pattern, verdict) in &self.verdicts {
            if request.finding_type.contains(pattern.as_str()) {
                return Ok(verdict.clone());
            }
        }

        Ok(self.default_verdict.clone())
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}
