// src/pipeline.rs

use reqwest::Client;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::PipelineError;
use crate::merge::merge;
use crate::process::reshape;
use crate::sink::{self, Sink};
use crate::sources::SourceRegistry;

/// What a completed run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub table: String,
    pub labels: Vec<String>,
    pub rows: usize,
}

/// Fetch, reshape, merge and replace the sink's table, stopping at the
/// first error. Nothing reaches the sink unless every source was read and
/// merged.
#[instrument(level = "info", skip_all, fields(table = %sink.table()))]
pub async fn run_with(
    client: &Client,
    sources: &SourceRegistry,
    sink: &dyn Sink,
) -> Result<RunSummary, PipelineError> {
    let tables = reshape(client, sources).await?;
    let merged = merge(&tables)?;
    info!(rows = merged.len(), columns = ?merged.column_names(), "merged");

    sink.replace_all(&merged).await?;

    Ok(RunSummary {
        table: sink.table().to_string(),
        labels: merged.labels,
        rows: merged.rows.len(),
    })
}

/// One full run from configuration.
pub async fn run(config: &Config) -> Result<RunSummary, PipelineError> {
    let sources = config.registry()?;
    let client = Client::new();
    let sink = sink::connect(&config.sink, &config.table).await?;
    run_with(&client, &sources, sink.as_ref()).await
}
