use anyhow::Context;
use clap::Parser;
use reel_config::ReelConfig;

mod cli;
mod commands;
mod output;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("reel error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let flags = cli.global_flags();
    let config = load_config(&flags)?;

    commands::dispatch(cli.command, config, &flags).await
}

fn load_config(flags: &cli::GlobalFlags) -> anyhow::Result<ReelConfig> {
    match flags.config.as_deref() {
        Some(path) => ReelConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => ReelConfig::load_with_dotenv().context("failed to load config"),
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("REEL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
