//! Command implementations for the CodeSweep CLI
//!
//! `scan` submits a job to the orchestrator and follows its progress to a
//! terminal state, `health` probes the analyzer and enrichment setup, and
//! `rules` lists the default rule bundles. `init-config` writes an
//! annotated starting configuration.

pub mod health;
pub mod rules;
pub mod scan;

use anyhow::{Context, Result};
use codesweep_orchestrator::config::{OrchestratorConfig, EXAMPLE_CONFIG};
use colored::Colorize;
use std::path::Path;

pub fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => OrchestratorConfig::from_env(),
    }
}

pub fn init_config(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", output.display());
    }
    std::fs::write(output, EXAMPLE_CONFIG.trim_start())
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "{} Wrote example configuration to {}",
        "✅".green(),
        output.display()
    );
    Ok(())
}
