//! GTFS editor E2E runner
//!
//! Runs the dependency-aware browser suite, previews what an isolated run
//! would execute, and manages the coverage collector.

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{collector, plan, run, stop};

/// Exit code when the harness itself failed (bad config, browser missing)
const EXIT_HARNESS_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "gtfs-e2e")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the E2E suite
    Run(run::RunArgs),

    /// Show each test's dependencies and the isolation plan
    Plan(plan::PlanArgs),

    /// Run the coverage collector
    Collector(collector::CollectorArgs),

    /// Stop a helper by its pid file
    Stop(stop::StopArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => match run::execute(args, cli.format).await {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                output::print_error(&format!("{:#}", e));
                std::process::exit(EXIT_HARNESS_ERROR);
            }
        },
        Commands::Plan(args) => plan::execute(args, cli.format).await?,
        Commands::Collector(args) => collector::execute(args).await?,
        Commands::Stop(args) => stop::execute(args).await?,
    }

    Ok(())
}
