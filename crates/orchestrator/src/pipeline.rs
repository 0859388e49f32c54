//! The scan pipeline: acquire, analyze, normalize, enrich, score.
//!
//! `submit` returns a job id immediately and drives the pipeline on a
//! spawned task. Callers observe progress through the registry; the job
//! record reaches exactly one terminal state, and scratch resources are
//! released on every exit path, including panics in the pipeline body.

use crate::acquire::{ResourceJanitor, ScanSource, SourceAcquirer};
use crate::analyzer::{normalize_findings, Analyzer, SemgrepAnalyzer};
use crate::config::OrchestratorConfig;
use crate::core::{JobState, ScanError, ScanJob, ScanResult, SeverityHistogram};
use crate::enrich::{
    Enricher, EnrichmentCache, EnrichmentError, EnrichmentProvider, OpenAiProvider,
};
use crate::registry::{ResultPoll, ScanJobRegistry};
use crate::score::risk_score;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// One scan submission.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub source: ScanSource,

    /// Rule identifiers; falls back to the configured defaults when empty.
    pub rules: Vec<String>,

    pub enrich: bool,
}

impl ScanRequest {
    pub fn new(source: ScanSource) -> Self {
        Self {
            source,
            rules: Vec::new(),
            enrich: true,
        }
    }

    pub fn with_rules(mut self, rules: Vec<String>) -> Self {
        self.rules = rules;
        self
    }

    pub fn without_enrichment(mut self) -> Self {
        self.enrich = false;
        self
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub analyzer: String,
    pub analyzer_available: bool,
    pub enrichment_enabled: bool,
    pub analyzer_timeout_secs: u64,
    pub max_repo_size_mb: u64,
    pub max_file_size_mb: u64,
    pub version: String,
}

pub struct ScanOrchestrator {
    config: OrchestratorConfig,
    registry: ScanJobRegistry,
    analyzer: Arc<dyn Analyzer>,
    enricher: Option<Arc<Enricher>>,
}

impl ScanOrchestrator {
    /// Build with the production analyzer and, when configured, the OpenAI
    /// enrichment provider. A missing API key disables enrichment rather
    /// than failing construction.
    pub fn new(config: OrchestratorConfig) -> anyhow::Result<Self> {
        let enricher = if config.enrichment.enabled {
            match OpenAiProvider::from_settings(&config.enrichment) {
                Ok(provider) => Some(Self::build_enricher(&config, Arc::new(provider))?),
                Err(EnrichmentError::NotConfigured(reason)) => {
                    warn!(%reason, "enrichment disabled");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "enrichment provider unavailable, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            registry: ScanJobRegistry::in_memory(config.max_tracked_jobs),
            analyzer: Arc::new(SemgrepAnalyzer::new()),
            enricher,
            config,
        })
    }

    /// Swap the analyzer, keeping everything else. Used by tests and by
    /// callers embedding a different tool.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Swap the enrichment provider, rebuilding the cache-fronted enricher
    /// from the current configuration.
    pub fn with_enrichment_provider(
        mut self,
        provider: Arc<dyn EnrichmentProvider>,
    ) -> anyhow::Result<Self> {
        self.enricher = Some(Self::build_enricher(&self.config, provider)?);
        Ok(self)
    }

    fn build_enricher(
        config: &OrchestratorConfig,
        provider: Arc<dyn EnrichmentProvider>,
    ) -> anyhow::Result<Arc<Enricher>> {
        let cache = EnrichmentCache::new(&config.enrichment.cache_dir)?;
        Ok(Arc::new(Enricher::new(
            provider,
            cache,
            config.enrichment.max_findings_enriched,
        )))
    }

    /// Register a job and start the pipeline for it in the background.
    pub fn submit(self: &Arc<Self>, request: ScanRequest) -> String {
        let job_id = self.registry.create();
        info!(job_id = %job_id, source = %request.source.describe(), "scan submitted");

        let orchestrator = Arc::clone(self);
        let id = job_id.clone();
        tokio::spawn(async move {
            orchestrator.run_job(id, request).await;
        });

        job_id
    }

    pub fn status(&self, job_id: &str) -> Result<ScanJob, ScanError> {
        self.registry
            .get(job_id)
            .ok_or_else(|| ScanError::JobNotFound(job_id.to_string()))
    }

    pub fn result(&self, job_id: &str) -> Result<ResultPoll, ScanError> {
        self.registry
            .result(job_id)
            .ok_or_else(|| ScanError::JobNotFound(job_id.to_string()))
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            analyzer: self.analyzer.name().to_string(),
            analyzer_available: self.analyzer.ensure_available().await.is_ok(),
            enrichment_enabled: self.enricher.is_some(),
            analyzer_timeout_secs: self.config.analyzer_timeout_secs,
            max_repo_size_mb: self.config.max_repo_size_mb,
            max_file_size_mb: self.config.max_file_size_mb,
            version: crate::VERSION.to_string(),
        }
    }

    pub fn default_rules(&self) -> &[String] {
        &self.config.default_rules
    }

    async fn run_job(self: Arc<Self>, job_id: String, request: ScanRequest) {
        let janitor = Arc::new(ResourceJanitor::new());

        // The pipeline body runs on its own task so a panic inside it is
        // caught at the join point and still produces a terminal state.
        let worker = {
            let this = Arc::clone(&self);
            let janitor = Arc::clone(&janitor);
            let job_id = job_id.clone();
            tokio::spawn(async move { this.execute(&job_id, &request, &janitor).await })
        };
        let outcome = worker.await;

        // Cleanup precedes the terminal write so a poller seeing a
        // terminal state can rely on scratch space being gone.
        janitor.cleanup();

        match outcome {
            Ok(Ok(result)) => {
                info!(
                    job_id = %job_id,
                    findings = result.total_findings,
                    risk_score = result.risk_score,
                    "scan completed"
                );
                self.registry.complete(&job_id, result);
            }
            Ok(Err(e)) => {
                let state = if e.is_timeout() {
                    JobState::Timeout
                } else {
                    JobState::Error
                };
                error!(job_id = %job_id, state = %state, error = %e, "scan failed");
                self.registry.fail(&job_id, state, e.to_string());
            }
            Err(join_error) => {
                let detail = if join_error.is_panic() {
                    "scan task panicked"
                } else {
                    "scan task was cancelled"
                };
                error!(job_id = %job_id, detail, "scan task aborted");
                self.registry.fail(&job_id, JobState::Error, detail);
            }
        }
    }

    async fn execute(
        &self,
        job_id: &str,
        request: &ScanRequest,
        janitor: &ResourceJanitor,
    ) -> Result<ScanResult, ScanError> {
        let started_at = chrono::Utc::now();
        let clock = Instant::now();

        if matches!(request.source, ScanSource::Remote { .. }) {
            self.registry.set_state(job_id, JobState::Cloning);
            self.registry.update(job_id, 10, "Cloning repository");
        }

        let acquirer = SourceAcquirer::from_config(&self.config);
        let root = acquirer.acquire(&request.source, janitor).await?;

        self.registry.set_state(job_id, JobState::Scanning);
        self.registry.update(job_id, 30, "Running static analysis");

        self.analyzer.ensure_available().await?;

        let rules = if request.rules.is_empty() {
            self.config.default_rules.clone()
        } else {
            request.rules.clone()
        };
        let raw = self
            .analyzer
            .run(
                &root,
                &rules,
                Duration::from_secs(self.config.analyzer_timeout_secs),
            )
            .await?;
        self.registry.update(
            job_id,
            70,
            format!("Analysis finished with {} findings", raw.len()),
        );

        let mut findings = normalize_findings(&raw);
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));

        if request.enrich {
            if let Some(enricher) = &self.enricher {
                self.registry.set_state(job_id, JobState::Enriching);
                let enriched = enricher
                    .enrich(&mut findings, &root, |index| {
                        let progress = (70 + (index as u64 + 1) * 2).min(99) as u8;
                        self.registry.update(
                            job_id,
                            progress,
                            format!("Enriched {} findings", index + 1),
                        );
                    })
                    .await;
                info!(job_id = %job_id, enriched, "enrichment pass finished");
            }
        }

        let mut by_severity = SeverityHistogram::default();
        for finding in &findings {
            by_severity.record(finding.severity);
        }

        Ok(ScanResult {
            scan_id: job_id.to_string(),
            source: request.source.describe(),
            branch: request.source.branch().map(str::to_string),
            total_findings: findings.len(),
            risk_score: risk_score(&by_severity),
            by_severity,
            findings,
            rules_used: rules,
            started_at,
            duration_seconds: clock.elapsed().as_secs_f64(),
            status: "completed".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerError, FakeAnalyzer, RawFinding};
    use crate::enrich::MockEnrichmentProvider;
    use std::path::Path;

    struct PanickingAnalyzer;

    #[async_trait::async_trait]
    impl Analyzer for PanickingAnalyzer {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn ensure_available(&self) -> Result<(), AnalyzerError> {
            Ok(())
        }

        async fn run(
            &self,
            _root: &Path,
            _rules: &[String],
            _timeout: Duration,
        ) -> Result<Vec<RawFinding>, AnalyzerError> {
            panic!("analyzer blew up mid-run")
        }
    }

    fn config_with_temp_cache(cache: &tempfile::TempDir) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.enrichment.enabled = false;
        config.enrichment.cache_dir = cache.path().to_path_buf();
        config
    }

    fn orchestrator(
        config: OrchestratorConfig,
        analyzer: Arc<dyn Analyzer>,
    ) -> Arc<ScanOrchestrator> {
        Arc::new(
            ScanOrchestrator::new(config)
                .expect("orchestrator builds")
                .with_analyzer(analyzer),
        )
    }

    async fn wait_terminal(orchestrator: &ScanOrchestrator, job_id: &str) -> ScanJob {
        for _ in 0..200 {
            let job = orchestrator.status(job_id).expect("job exists");
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_unknown_job_id() {
        let cache = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(FakeAnalyzer::empty()),
        );
        assert!(matches!(
            orchestrator.status("missing"),
            Err(ScanError::JobNotFound(_))
        ));
        assert!(matches!(
            orchestrator.result("missing"),
            Err(ScanError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_of_clean_tree_completes_with_zero_risk() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("main.py"), "print('hello')\n").unwrap();

        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(FakeAnalyzer::empty()),
        );
        let job_id = orchestrator.submit(ScanRequest::new(ScanSource::local(tree.path())));

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);

        match orchestrator.result(&job_id).unwrap() {
            ResultPoll::Ready(result) => {
                assert_eq!(result.total_findings, 0);
                assert_eq!(result.risk_score, 0.0);
                assert_eq!(result.status, "completed");
                assert_eq!(result.scan_id, job_id);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_findings_are_sorted_and_scored() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("app.py"), "x = 1\n").unwrap();

        let raw = vec![
            RawFinding::new("low-rule", "app.py").with_severity("INFO"),
            RawFinding::new("critical-rule", "app.py").with_severity("ERROR"),
            RawFinding::new("high-rule", "app.py").with_severity("WARNING"),
        ];
        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(FakeAnalyzer::returning(raw)),
        );
        let job_id = orchestrator
            .submit(ScanRequest::new(ScanSource::local(tree.path())).without_enrichment());
        wait_terminal(&orchestrator, &job_id).await;

        let ResultPoll::Ready(result) = orchestrator.result(&job_id).unwrap() else {
            panic!("expected Ready");
        };
        assert_eq!(result.total_findings, 3);
        assert_eq!(result.findings[0].check_id, "critical-rule");
        assert_eq!(result.findings[1].check_id, "high-rule");
        assert_eq!(result.findings[2].check_id, "low-rule");
        // (10 + 7 + 1) / 10
        assert_eq!(result.risk_score, 1.8);
        assert_eq!(result.by_severity.critical, 1);
    }

    #[tokio::test]
    async fn test_analyzer_timeout_surfaces_as_timeout_state() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();

        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(FakeAnalyzer::timing_out()),
        );
        let job_id = orchestrator.submit(ScanRequest::new(ScanSource::local(tree.path())));

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Timeout);
        assert!(job.progress < 100);
        assert!(job.error.is_some());

        match orchestrator.result(&job_id).unwrap() {
            ResultPoll::Failed { state, .. } => assert_eq!(state, JobState::Timeout),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_analyzer_crash_surfaces_as_error_state() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();

        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(FakeAnalyzer::crashing()),
        );
        let job_id = orchestrator.submit(ScanRequest::new(ScanSource::local(tree.path())));

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Error);
    }

    #[tokio::test]
    async fn test_missing_local_path_fails_the_job() {
        let cache = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(FakeAnalyzer::empty()),
        );
        let job_id =
            orchestrator.submit(ScanRequest::new(ScanSource::local("/no/such/tree/anywhere")));

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Error);
        assert!(job.error.unwrap().contains("not a directory"));
    }

    #[tokio::test]
    async fn test_panic_in_pipeline_body_still_terminates_the_job() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("app.py"), "x = 1\n").unwrap();

        let orchestrator = orchestrator(
            config_with_temp_cache(&cache),
            Arc::new(PanickingAnalyzer),
        );
        let job_id = orchestrator.submit(ScanRequest::new(ScanSource::local(tree.path())));

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Error);
        assert!(job.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_enrichment_attaches_verdicts() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("app.py"), "query = build(user_input)\n").unwrap();

        let raw = vec![RawFinding::new("sql-injection", "app.py")
            .with_severity("ERROR")
            .with_span(1, 1, 1, 10)];
        let orchestrator = Arc::new(
            ScanOrchestrator::new(config_with_temp_cache(&cache))
                .unwrap()
                .with_analyzer(Arc::new(FakeAnalyzer::returning(raw)))
                .with_enrichment_provider(Arc::new(MockEnrichmentProvider::new()))
                .unwrap(),
        );

        let job_id = orchestrator.submit(ScanRequest::new(ScanSource::local(tree.path())));
        wait_terminal(&orchestrator, &job_id).await;

        let ResultPoll::Ready(result) = orchestrator.result(&job_id).unwrap() else {
            panic!("expected Ready");
        };
        let enrichment = result.findings[0].enrichment.as_ref().unwrap();
        assert!(enrichment.is_true_positive);
        assert!(!enrichment.from_cache);
    }

    #[tokio::test]
    async fn test_enrichment_failure_does_not_fail_the_scan() {
        let cache = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("app.py"), "x = secret\n").unwrap();

        let raw = vec![RawFinding::new("hardcoded-secret", "app.py")
            .with_severity("ERROR")
            .with_span(1, 1, 1, 5)];
        let orchestrator = Arc::new(
            ScanOrchestrator::new(config_with_temp_cache(&cache))
                .unwrap()
                .with_analyzer(Arc::new(FakeAnalyzer::returning(raw)))
                .with_enrichment_provider(Arc::new(MockEnrichmentProvider::failing()))
                .unwrap(),
        );

        let job_id = orchestrator.submit(ScanRequest::new(ScanSource::local(tree.path())));
        let job = wait_terminal(&orchestrator, &job_id).await;

        assert_eq!(job.state, JobState::Completed);
        let ResultPoll::Ready(result) = orchestrator.result(&job_id).unwrap() else {
            panic!("expected Ready");
        };
        assert_eq!(result.total_findings, 1);
        assert!(result.findings[0].enrichment.is_none());
    }
}
