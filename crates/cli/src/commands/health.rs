//! Health command: verify the analyzer can run and report what is wired up.

use anyhow::Result;
use clap::Args;
use codesweep_orchestrator::config::OrchestratorConfig;
use codesweep_orchestrator::pipeline::ScanOrchestrator;
use colored::Colorize;

#[derive(Args)]
pub struct HealthArgs {
    /// Emit the report as JSON instead of console output.
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(config: OrchestratorConfig, args: HealthArgs) -> Result<()> {
    let orchestrator = ScanOrchestrator::new(config)?;
    let report = orchestrator.health().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "🩺 CodeSweep Health".bright_cyan().bold());
    println!("{}", "=".repeat(40).bright_cyan());
    println!("Version: {}", report.version);

    let analyzer = if report.analyzer_available {
        format!("{} available", report.analyzer).bright_green()
    } else {
        format!("{} unavailable", report.analyzer).bright_red()
    };
    println!("Analyzer: {}", analyzer);

    let enrichment = if report.enrichment_enabled {
        "enabled".bright_green()
    } else {
        "disabled".dimmed()
    };
    println!("Enrichment: {}", enrichment);
    println!(
        "Limits: {}s analyzer timeout, {}MB repo, {}MB file",
        report.analyzer_timeout_secs, report.max_repo_size_mb, report.max_file_size_mb
    );

    if !report.analyzer_available {
        anyhow::bail!("analyzer is not available");
    }
    Ok(())
}
