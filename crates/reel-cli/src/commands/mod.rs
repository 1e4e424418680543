pub mod config;
pub mod graph;
pub mod history;
pub mod run;

use reel_config::ReelConfig;

use crate::cli::{Commands, GlobalFlags};

/// Dispatch a parsed command to the corresponding handler module.
pub async fn dispatch(
    command: Commands,
    config: ReelConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run::handle(&args, config, flags).await,
        Commands::Graph => graph::handle(config, flags),
        Commands::Config => config::handle(&config, flags),
        Commands::History(args) => history::handle(&args, &config, flags),
    }
}
