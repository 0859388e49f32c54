//! Rules command: show the rule bundles a scan uses by default.

use anyhow::Result;
use codesweep_orchestrator::config::OrchestratorConfig;
use colored::Colorize;

pub fn execute(config: &OrchestratorConfig) -> Result<()> {
    println!("{}", "📋 Default rule bundles".bright_cyan().bold());
    for rule in &config.default_rules {
        println!("  - {}", rule);
    }
    println!(
        "\n{}",
        "Override with --rules or the CODESWEEP_RULES environment variable.".dimmed()
    );
    Ok(())
}
