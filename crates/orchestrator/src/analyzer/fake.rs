use crate::analyzer::{Analyzer, AnalyzerError, RawFinding};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted analyzer for exercising the pipeline without semgrep or a
/// network. Each constructor fixes one of the three run outcomes.
pub struct FakeAnalyzer {
    findings: Vec<RawFinding>,
    outcome: Outcome,
    delay: Duration,
    run_count: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Succeed,
    TimeOut,
    Crash,
    Unavailable,
}

impl FakeAnalyzer {
    pub fn returning(findings: Vec<RawFinding>) -> Self {
        Self {
            findings,
            outcome: Outcome::Succeed,
            delay: Duration::ZERO,
            run_count: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::returning(Vec::new())
    }

    pub fn timing_out() -> Self {
        Self {
            findings: Vec::new(),
            outcome: Outcome::TimeOut,
            delay: Duration::ZERO,
            run_count: AtomicUsize::new(0),
        }
    }

    pub fn crashing() -> Self {
        Self {
            findings: Vec::new(),
            outcome: Outcome::Crash,
            delay: Duration::ZERO,
            run_count: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            findings: Vec::new(),
            outcome: Outcome::Unavailable,
            delay: Duration::ZERO,
            run_count: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ensure_available(&self) -> Result<(), AnalyzerError> {
        if self.outcome == Outcome::Unavailable {
            return Err(AnalyzerError::Unavailable(
                "fake analyzer configured as unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn run(
        &self,
        _root: &Path,
        _rules: &[String],
        timeout: Duration,
    ) -> Result<Vec<RawFinding>, AnalyzerError> {
        self.run_count.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.outcome {
            Outcome::Succeed => Ok(self.findings.clone()),
            Outcome::TimeOut => Err(AnalyzerError::Timeout(timeout.as_secs())),
            Outcome::Crash => Err(AnalyzerError::Crash(
                "exit code Some(2): fake crash".to_string(),
            )),
            Outcome::Unavailable => Err(AnalyzerError::Unavailable(
                "fake analyzer configured as unavailable".to_string(),
            )),
        }
    }
}
