//! External static-analysis tool invocation.
//!
//! The concrete tool sits behind the [`Analyzer`] trait so the pipeline can
//! be exercised with a fake and the tool swapped without touching callers.
//! Three outcomes are distinguished for a run: success (exit 0 with
//! parseable JSON), timeout (child killed at the deadline, partial output
//! discarded), and crash (non-zero exit or unparseable output).

pub mod fake;
pub mod normalize;
pub mod raw;
pub mod semgrep;

pub use fake::FakeAnalyzer;
pub use normalize::normalize_findings;
pub use raw::RawFinding;
pub use semgrep::SemgrepAnalyzer;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("analyzer timed out after {0}s")]
    Timeout(u64),

    #[error("analyzer crashed: {0}")]
    Crash(String),
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verify the tool can be invoked, installing it if this analyzer
    /// knows how. Called once per run, before the subprocess is spawned.
    async fn ensure_available(&self) -> Result<(), AnalyzerError>;

    /// Run the tool over `root` with the given rule identifiers, bounded
    /// by `timeout` plus a small teardown grace period. Never blocks the
    /// caller past that bound.
    async fn run(
        &self,
        root: &Path,
        rules: &[String],
        timeout: Duration,
    ) -> Result<Vec<RawFinding>, AnalyzerError>;
}
