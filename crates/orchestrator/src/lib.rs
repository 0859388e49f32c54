//! CodeSweep orchestration engine.
//!
//! Coordinates asynchronous security scans end to end: acquiring the
//! target repository under size limits, driving an external static
//! analyzer, normalizing its findings into a stable schema, optionally
//! enriching the top findings with an AI classifier, and scoring the
//! aggregate risk. Jobs run in the background and are observed through a
//! registry of progress records.
//!
//! ```no_run
//! use codesweep_orchestrator::acquire::ScanSource;
//! use codesweep_orchestrator::config::OrchestratorConfig;
//! use codesweep_orchestrator::pipeline::{ScanOrchestrator, ScanRequest};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator = Arc::new(ScanOrchestrator::new(OrchestratorConfig::from_env()?)?);
//! let job_id = orchestrator.submit(ScanRequest::new(ScanSource::remote(
//!     "https://github.com/acme/app",
//! )));
//! let job = orchestrator.status(&job_id)?;
//! println!("{}: {}%", job.state, job.progress);
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod analyzer;
pub mod config;
pub mod core;
pub mod enrich;
pub mod pipeline;
pub mod registry;
pub mod score;

pub use acquire::{ResourceJanitor, ScanSource};
pub use analyzer::{Analyzer, AnalyzerError, SemgrepAnalyzer};
pub use config::OrchestratorConfig;
pub use core::{
    Finding, JobState, ScanError, ScanJob, ScanResult, Severity, SeverityHistogram,
};
pub use pipeline::{HealthReport, ScanOrchestrator, ScanRequest};
pub use registry::{ResultPoll, ScanJobRegistry};
pub use score::risk_score;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
