//! Core domain model for the scan orchestration engine.
//!
//! Findings, severities, job lifecycle records and the completed-scan
//! document live here, together with the fatal-error taxonomy. Everything
//! in this module is plain data; behavior (acquisition, analysis,
//! enrichment, scoring) lives in the sibling modules.

pub mod error;
pub mod finding;
pub mod job;
pub mod result;
pub mod severity;

pub use error::{AcquireError, ScanError};
pub use finding::Finding;
pub use job::{JobState, ScanJob};
pub use result::ScanResult;
pub use severity::{Severity, SeverityHistogram};
