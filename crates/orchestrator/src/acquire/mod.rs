//! Bounded acquisition of the file tree to scan.
//!
//! Remote sources are shallow-cloned into a fresh scratch directory; if the
//! server rejects shallow clones the acquirer retries with a full clone
//! under an extended budget. Both remote and local trees are then checked
//! against the repository size limit, and individual oversized files are
//! stripped before the analyzer sees the tree.
//!
//! Auth tokens are spliced into the clone URL for the duration of the clone
//! only, and scrubbed from every error message and log line.

pub mod janitor;

pub use janitor::ResourceJanitor;

use crate::config::OrchestratorConfig;
use crate::core::AcquireError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const MB: u64 = 1024 * 1024;

/// What to scan: a remote git URL or an existing local directory.
#[derive(Debug, Clone)]
pub enum ScanSource {
    Remote {
        url: String,
        branch: Option<String>,
        token: Option<String>,
    },
    Local {
        path: PathBuf,
    },
}

impl ScanSource {
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            branch: None,
            token: None,
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    pub fn with_branch(self, branch: Option<String>) -> Self {
        match self {
            Self::Remote { url, token, .. } => Self::Remote { url, branch, token },
            other => other,
        }
    }

    pub fn with_token(self, token: Option<String>) -> Self {
        match self {
            Self::Remote { url, branch, .. } => Self::Remote { url, branch, token },
            other => other,
        }
    }

    /// Credential-free description, safe for logs and result documents.
    pub fn describe(&self) -> String {
        match self {
            Self::Remote { url, .. } => url.clone(),
            Self::Local { path } => path.display().to_string(),
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Remote { branch, .. } => branch.as_deref(),
            Self::Local { .. } => None,
        }
    }
}

pub struct SourceAcquirer {
    clone_timeout: Duration,
    full_clone_timeout: Duration,
    max_repo_size_mb: u64,
    max_file_size_mb: u64,
}

impl SourceAcquirer {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            clone_timeout: Duration::from_secs(config.clone_timeout_secs),
            full_clone_timeout: Duration::from_secs(config.full_clone_timeout_secs),
            max_repo_size_mb: config.max_repo_size_mb,
            max_file_size_mb: config.max_file_size_mb,
        }
    }

    /// Materialize the source as a local directory ready for the analyzer.
    ///
    /// Scratch directories are registered with the janitor before anything
    /// is written into them, so cleanup runs even when acquisition fails
    /// halfway through.
    pub async fn acquire(
        &self,
        source: &ScanSource,
        janitor: &ResourceJanitor,
    ) -> Result<PathBuf, AcquireError> {
        let root = match source {
            ScanSource::Remote { url, branch, token } => {
                self.clone_repository(url, branch.as_deref(), token.as_deref(), janitor)
                    .await?
            }
            ScanSource::Local { path } => {
                if !path.is_dir() {
                    return Err(AcquireError::NotADirectory(path.clone()));
                }
                path.clone()
            }
        };

        let size_bytes = measure_tree(&root);
        let limit_bytes = self.max_repo_size_mb * MB;
        if size_bytes > limit_bytes {
            return Err(AcquireError::SizeLimitExceeded {
                actual_mb: size_bytes.div_ceil(MB),
                limit_mb: self.max_repo_size_mb,
            });
        }

        self.strip_large_files(&root);
        Ok(root)
    }

    async fn clone_repository(
        &self,
        url: &str,
        branch: Option<&str>,
        token: Option<&str>,
        janitor: &ResourceJanitor,
    ) -> Result<PathBuf, AcquireError> {
        let dest = tempfile::Builder::new()
            .prefix("codesweep_scan_")
            .tempdir()?
            .keep();
        janitor.register(&dest);

        let clone_url = match token {
            Some(token) if url.starts_with("https://") => {
                url.replacen("https://", &format!("https://{token}@"), 1)
            }
            _ => url.to_string(),
        };

        info!(url, shallow = true, "cloning repository");
        let output = self
            .run_git_clone(&clone_url, branch, &dest, true, self.clone_timeout, token)
            .await?;

        if output.status.success() {
            return Ok(dest);
        }

        let stderr = scrub(&String::from_utf8_lossy(&output.stderr), token);

        // Some servers refuse depth-limited fetches; retry once without
        // --depth under the extended budget.
        if stderr.to_lowercase().contains("shallow") {
            warn!(url, "shallow clone rejected, retrying with full clone");
            clear_dir(&dest)?;
            let output = self
                .run_git_clone(
                    &clone_url,
                    branch,
                    &dest,
                    false,
                    self.full_clone_timeout,
                    token,
                )
                .await?;
            if output.status.success() {
                return Ok(dest);
            }
            let stderr = scrub(&String::from_utf8_lossy(&output.stderr), token);
            return Err(AcquireError::CloneFailed(stderr.trim().to_string()));
        }

        Err(AcquireError::CloneFailed(stderr.trim().to_string()))
    }

    async fn run_git_clone(
        &self,
        clone_url: &str,
        branch: Option<&str>,
        dest: &Path,
        shallow: bool,
        timeout: Duration,
        token: Option<&str>,
    ) -> Result<std::process::Output, AcquireError> {
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if shallow {
            cmd.args(["--depth", "1"]);
        }
        if let Some(branch) = branch {
            cmd.args(["--branch", branch]);
        }
        cmd.arg(clone_url)
            .arg(dest)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            AcquireError::CloneFailed(scrub(&format!("failed to spawn git: {e}"), token))
        })?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => Err(AcquireError::CloneTimeout(timeout.as_secs())),
        }
    }

    /// Delete individual files over the per-file limit so the analyzer
    /// never loads them. Failures to stat or remove are skipped.
    fn strip_large_files(&self, root: &Path) {
        let limit = self.max_file_size_mb * MB;
        let mut stripped = 0usize;

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.len() > limit {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => {
                        stripped += 1;
                        debug!(path = %entry.path().display(), size = metadata.len(), "stripped oversized file");
                    }
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "failed to strip oversized file")
                    }
                }
            }
        }

        if stripped > 0 {
            info!(stripped, limit_mb = self.max_file_size_mb, "removed oversized files before analysis");
        }
    }
}

/// Total on-disk size of regular files under `root`.
fn measure_tree(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Replace any occurrence of the auth token so it cannot reach logs or
/// error messages. Git echoes the full remote URL in its diagnostics.
fn scrub(text: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => text.replace(token, "***"),
        _ => text.to_string(),
    }
}

fn clear_dir(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
