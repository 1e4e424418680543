use chrono::NaiveDate;
use clap::{Args, Subcommand};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Run the pipeline once now.
    Run(RunArgs),
    /// Show tasks in dependency order with their upstream tasks and retry budgets.
    Graph,
    /// Show the resolved configuration.
    Config,
    /// Show recently recorded runs, newest first.
    History(HistoryArgs),
}

#[derive(Clone, Debug, Args)]
pub struct RunArgs {
    /// Logical date of the run (YYYY-MM-DD). Defaults to today in UTC.
    #[arg(long)]
    pub logical_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Args)]
pub struct HistoryArgs {
    /// Number of runs to show.
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,
}
