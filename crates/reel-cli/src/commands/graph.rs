use std::sync::Arc;

use anyhow::Context;
use reel_config::ReelConfig;
use reel_etl::{EtlPipeline, PipelineInfo};
use reel_flow::NodeSummary;
use reel_store::StoreGateway;
use serde::Serialize;

use crate::cli::{GlobalFlags, OutputFormat};
use crate::output::output;

/// Response for `reel graph` in json/raw format.
#[derive(Debug, Serialize)]
struct GraphResponse {
    pipeline: PipelineInfo,
    tasks: Vec<NodeSummary>,
}

#[derive(Debug, Serialize)]
struct GraphRow {
    task: String,
    upstream: Vec<String>,
    retries: u32,
    delay_secs: u64,
}

impl From<NodeSummary> for GraphRow {
    fn from(summary: NodeSummary) -> Self {
        Self {
            task: summary.id.to_string(),
            upstream: summary.upstream.iter().map(ToString::to_string).collect(),
            retries: summary.retry.retries,
            delay_secs: summary.retry.delay.as_secs(),
        }
    }
}

/// Handle `reel graph`: pipeline metadata plus tasks in dependency order.
///
/// Builds the graph against an in-memory store so inspecting the topology
/// never touches the configured database.
pub fn handle(config: ReelConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let store = StoreGateway::open_in_memory().context("failed to open scratch store")?;
    let pipeline = EtlPipeline::new(config, Arc::new(store));
    let tasks = pipeline.graph()?.summaries();
    let info = pipeline.info();

    match flags.format {
        OutputFormat::Table => {
            output(&info, flags.format)?;
            println!();
            let rows: Vec<GraphRow> = tasks.into_iter().map(GraphRow::from).collect();
            output(&rows, flags.format)
        }
        OutputFormat::Json | OutputFormat::Raw => output(
            &GraphResponse {
                pipeline: info,
                tasks,
            },
            flags.format,
        ),
    }
}
