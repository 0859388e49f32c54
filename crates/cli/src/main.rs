use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
use commands::{health::HealthArgs, scan::ScanArgs};

#[derive(Parser)]
#[command(name = "codesweep")]
#[command(about = "Security scan orchestrator for git repositories and local trees")]
#[command(version)]
struct Cli {
    /// YAML configuration file; environment variables are used when absent.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scan and wait for the report.
    Scan(ScanArgs),

    /// Probe the analyzer and enrichment configuration.
    Health(HealthArgs),

    /// List the rule bundles used when none are given.
    Rules,

    /// Write an annotated example configuration file.
    InitConfig {
        #[arg(short, long, default_value = "codesweep.yaml")]
        output: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan(args) => commands::scan::execute(config, args).await,
        Commands::Health(args) => commands::health::execute(config, args).await,
        Commands::Rules => commands::rules::execute(&config),
        Commands::InitConfig { output } => commands::init_config(&output),
    }
}
