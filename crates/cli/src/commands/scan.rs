//! Scan command: submit a job, follow its progress, render the report.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use codesweep_orchestrator::acquire::ScanSource;
use codesweep_orchestrator::config::OrchestratorConfig;
use codesweep_orchestrator::core::{JobState, ScanResult};
use codesweep_orchestrator::pipeline::{ScanOrchestrator, ScanRequest};
use codesweep_orchestrator::registry::ResultPoll;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Args)]
pub struct ScanArgs {
    /// Git URL of the repository to clone and scan.
    #[arg(long, conflicts_with = "path", required_unless_present = "path")]
    pub url: Option<String>,

    /// Existing local directory to scan in place.
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Branch to check out; the default branch when omitted.
    #[arg(long, requires = "url")]
    pub branch: Option<String>,

    /// Environment variable holding an auth token for private repositories.
    /// The token itself never appears on the command line or in output.
    #[arg(long, requires = "url")]
    pub token_env: Option<String>,

    /// Rule bundles to run, comma separated. Configured defaults when empty.
    #[arg(long, value_delimiter = ',')]
    pub rules: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Skip AI enrichment even when it is configured.
    #[arg(long)]
    pub no_enrich: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum OutputFormat {
    Console,
    Json,
    Markdown,
}

pub async fn execute(config: OrchestratorConfig, args: ScanArgs) -> Result<()> {
    let source = build_source(&args)?;
    let console = args.format == OutputFormat::Console;

    if console {
        println!("{}", "🔍 CodeSweep Security Scan".bright_cyan().bold());
        println!("{}", "=".repeat(60).bright_cyan());
        println!("📁 Target: {}", source.describe());
        if let Some(branch) = source.branch() {
            println!("🌿 Branch: {}", branch);
        }
    }

    let orchestrator = Arc::new(ScanOrchestrator::new(config)?);

    let mut request = ScanRequest::new(source).with_rules(args.rules.clone());
    if args.no_enrich {
        request = request.without_enrichment();
    }
    let job_id = orchestrator.submit(request);

    if console && args.verbose {
        println!("🆔 Job: {}", job_id);
    }

    let job = follow(&orchestrator, &job_id, console).await?;

    match orchestrator.result(&job_id)? {
        ResultPoll::Ready(result) => render(&result, args.format, args.verbose),
        ResultPoll::Failed { state, error } => {
            if console {
                let label = match state {
                    JobState::Timeout => "⏱️  TIMEOUT".bright_yellow().bold(),
                    _ => "❌ FAILED".bright_red().bold(),
                };
                println!("\n{}", label);
            }
            anyhow::bail!("scan {}: {}", state, error)
        }
        ResultPoll::Running { .. } => {
            anyhow::bail!("job {} still running after terminal state {}", job_id, job.state)
        }
    }
}

fn build_source(args: &ScanArgs) -> Result<ScanSource> {
    if let Some(url) = &args.url {
        let token = match &args.token_env {
            Some(var) => Some(
                std::env::var(var)
                    .with_context(|| format!("token environment variable {var} is not set"))?,
            ),
            None => None,
        };
        Ok(ScanSource::remote(url)
            .with_branch(args.branch.clone())
            .with_token(token))
    } else if let Some(path) = &args.path {
        Ok(ScanSource::local(path))
    } else {
        anyhow::bail!("either --url or --path is required")
    }
}

/// Poll the job until it reaches a terminal state, echoing progress
/// transitions in console mode.
async fn follow(
    orchestrator: &ScanOrchestrator,
    job_id: &str,
    console: bool,
) -> Result<codesweep_orchestrator::core::ScanJob> {
    let mut last_progress = None;

    loop {
        let job = orchestrator.status(job_id)?;

        if console && last_progress != Some((job.progress, job.message.clone())) {
            println!(
                "  [{:>3}%] {} {}",
                job.progress,
                format!("{:<9}", job.state.to_string()).bright_blue(),
                job.message.dimmed()
            );
            last_progress = Some((job.progress, job.message.clone()));
        }

        if job.state.is_terminal() {
            return Ok(job);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn render(result: &ScanResult, format: OutputFormat, verbose: bool) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", result.to_json()?),
        OutputFormat::Markdown => println!("{}", result.to_markdown()),
        OutputFormat::Console => render_console(result, verbose),
    }
    Ok(())
}

fn render_console(result: &ScanResult, verbose: bool) {
    println!("\n{}", "=".repeat(60).bright_cyan());
    println!(
        "{} Scan completed in {:.1}s",
        "✅".green(),
        result.duration_seconds
    );

    let score = format!("{:.1}/10", result.risk_score);
    let score = if result.risk_score >= 7.0 {
        score.bright_red().bold()
    } else if result.risk_score >= 4.0 {
        score.bright_yellow().bold()
    } else {
        score.bright_green().bold()
    };
    println!("📊 Risk score: {}", score);

    if result.findings.is_empty() {
        println!("✅ No findings");
        return;
    }

    println!(
        "⚠️  {} findings ({} critical, {} high, {} medium, {} low)",
        result.total_findings,
        result.by_severity.critical,
        result.by_severity.high,
        result.by_severity.medium,
        result.by_severity.low
    );

    for (i, finding) in result.findings.iter().enumerate() {
        println!(
            "\n{}. {} {}: {}",
            i + 1,
            finding.severity.emoji(),
            finding.severity.to_string().bold(),
            finding.check_id.bright_white().bold()
        );
        println!("   📍 {}:{}:{}", finding.file, finding.line, finding.column);
        println!("   {}", finding.message.dimmed());

        if verbose {
            if let Some(cwe) = &finding.cwe {
                println!("   CWE: {}", cwe);
            }
            if let Some(owasp) = &finding.owasp {
                println!("   OWASP: {}", owasp);
            }
        }

        if let Some(enrichment) = &finding.enrichment {
            let verdict = if enrichment.is_true_positive {
                "true positive".bright_red()
            } else {
                "likely false positive".bright_green()
            };
            let cached = if enrichment.from_cache { " (cached)" } else { "" };
            println!(
                "   🤖 {} (confidence {:.2}){}",
                verdict, enrichment.confidence, cached
            );
            if verbose {
                println!("      {}", enrichment.explanation.dimmed());
                if let Some(fix) = &enrichment.suggested_fix {
                    println!("      💡 {}", fix);
                }
            }
        }
    }
}
