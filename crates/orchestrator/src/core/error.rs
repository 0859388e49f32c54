use crate::analyzer::AnalyzerError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while obtaining a local file tree to scan. All of these are
/// terminal for the job that hit them.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("git clone failed: {0}")]
    CloneFailed(String),

    #[error("repository clone timed out after {0}s")]
    CloneTimeout(u64),

    #[error("repository size {actual_mb}MB exceeds the {limit_mb}MB limit")]
    SizeLimitExceeded { actual_mb: u64, limit_mb: u64 },

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal pipeline failures. Enrichment errors are deliberately absent:
/// they are recovered inside the enrichment step and never reach here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Acquisition(#[from] AcquireError),

    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error("unknown job id: {0}")]
    JobNotFound(String),
}

impl ScanError {
    /// Whether the failure should surface as job state `Timeout` rather
    /// than `Error`.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Acquisition(AcquireError::CloneTimeout(_))
                | Self::Analyzer(AnalyzerError::Timeout(_))
        )
    }
}
