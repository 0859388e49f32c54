use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one asynchronous scan job.
///
/// The machine is monotonic: `Starting → Cloning → Scanning → Enriching`
/// followed by exactly one of the terminal states. Terminal states are
/// immutable once set; the registry rejects later writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Starting,
    Cloning,
    Scanning,
    Enriching,
    Completed,
    Timeout,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Timeout | Self::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Cloning => write!(f, "cloning"),
            Self::Scanning => write!(f, "scanning"),
            Self::Enriching => write!(f, "enriching"),
            Self::Completed => write!(f, "completed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The lifecycle record for one scan request, owned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: String,

    pub state: JobState,

    /// 0..=100.
    pub progress: u8,

    pub message: String,

    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanJob {
    pub fn new(id: String) -> Self {
        Self {
            id,
            state: JobState::Starting,
            progress: 0,
            message: "Initializing scan".to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}
