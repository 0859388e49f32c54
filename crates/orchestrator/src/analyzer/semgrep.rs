use crate::analyzer::{Analyzer, AnalyzerError, RawFinding};
use crate::analyzer::raw::RawReport;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Grace period on top of the configured deadline, covering semgrep's own
/// teardown once its internal `--timeout` fires.
const TEARDOWN_GRACE: Duration = Duration::from_secs(30);

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Out-of-process Semgrep invocation with structured JSON output.
pub struct SemgrepAnalyzer {
    /// One install attempt per process; a second failure is final.
    install_attempted: AtomicBool,
}

impl SemgrepAnalyzer {
    pub fn new() -> Self {
        Self {
            install_attempted: AtomicBool::new(false),
        }
    }

    async fn is_installed(&self) -> bool {
        let probe = Command::new("semgrep")
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let Ok(child) = probe else {
            return false;
        };

        match tokio::time::timeout(VERSION_PROBE_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }

    async fn install(&self) -> bool {
        if self.install_attempted.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("semgrep not found, attempting one-time install via pip");
        let install = Command::new("pip")
            .args(["install", "semgrep"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let Ok(child) = install else {
            return false;
        };

        match tokio::time::timeout(INSTALL_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => self.is_installed().await,
            _ => false,
        }
    }
}

impl Default for SemgrepAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for SemgrepAnalyzer {
    fn name(&self) -> &'static str {
        "semgrep"
    }

    async fn ensure_available(&self) -> Result<(), AnalyzerError> {
        if self.is_installed().await {
            return Ok(());
        }
        if self.install().await {
            return Ok(());
        }
        Err(AnalyzerError::Unavailable(
            "semgrep is not installed and could not be installed".to_string(),
        ))
    }

    async fn run(
        &self,
        root: &Path,
        rules: &[String],
        timeout: Duration,
    ) -> Result<Vec<RawFinding>, AnalyzerError> {
        let config = rules.join(",");
        debug!(root = %root.display(), rules = %config, timeout_secs = timeout.as_secs(), "invoking semgrep");

        let child = Command::new("semgrep")
            .args(["--config", &config])
            .arg("--json")
            .arg("--no-git-ignore")
            .args(["--max-memory", "4096"])
            .args(["--timeout", &timeout.as_secs().to_string()])
            .arg("--quiet")
            .arg(root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AnalyzerError::Unavailable(format!("failed to spawn semgrep: {e}")))?;

        let output = match tokio::time::timeout(timeout + TEARDOWN_GRACE, child.wait_with_output())
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AnalyzerError::Crash(format!("subprocess io error: {e}"))),
            // The child is killed on drop; whatever partial output it
            // produced is discarded with it.
            Err(_) => return Err(AnalyzerError::Timeout(timeout.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), "semgrep exited abnormally");
            return Err(AnalyzerError::Crash(format!(
                "exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = RawReport::parse(&stdout)
            .map_err(|e| AnalyzerError::Crash(format!("unparseable tool output: {e}")))?;

        if !report.errors.is_empty() {
            debug!(count = report.errors.len(), "semgrep reported non-fatal rule errors");
        }

        Ok(report.results)
    }
}
