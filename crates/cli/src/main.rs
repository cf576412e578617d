//! Thin command-line collaborator for the pairmaker engine (SPEC_FULL.md §6 "CLI"): loads
//! the initial config, starts the live loop, and exposes the `preflight` safety check. The
//! loop's shape (cancellation signal, graceful-shutdown file trigger) lives in
//! `commands::run`; this binary is just clap dispatch plus logging init.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pairmaker")]
#[command(about = "Reward-farming / merge-arbitrage market maker for a binary prediction-market exchange", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit structured JSON logs instead of the default human-readable format.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live engine loop.
    Run(commands::RunArgs),
    /// Check wallet balance, chain connectivity, and approval state before going live.
    Preflight(commands::PreflightArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Run(args) => commands::run_live(args).await,
        Commands::Preflight(args) => {
            let config = pairmaker_core::ConfigLoader::load()?;
            commands::run_preflight(args, &config).await
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
