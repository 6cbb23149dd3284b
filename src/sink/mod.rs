// src/sink/mod.rs

pub mod duck;
pub mod mysql;
pub mod parquet;

use async_trait::async_trait;

use crate::config::SinkConfig;
use crate::error::PipelineError;
use crate::table::MergedTable;

pub use duck::DuckDbSink;
pub use mysql::MySqlSink;
pub use parquet::ParquetSink;

/// A store that receives the merged table.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name of the table this sink writes.
    fn table(&self) -> &str;

    /// Create the table if absent, otherwise replace all of its rows. Column
    /// names are written verbatim and no index column is added.
    async fn replace_all(&self, table: &MergedTable) -> Result<(), PipelineError>;

    /// Read the stored table back with the given value columns.
    async fn read_all(&self, labels: &[String]) -> Result<MergedTable, PipelineError>;
}

/// Open the sink described by `config` for `table`.
pub async fn connect(config: &SinkConfig, table: &str) -> Result<Box<dyn Sink>, PipelineError> {
    let sink: Box<dyn Sink> = match config {
        SinkConfig::Mysql(options) => Box::new(MySqlSink::connect(options, table).await?),
        SinkConfig::Duckdb(file) => Box::new(DuckDbSink::open(&file.path, table)?),
        SinkConfig::Parquet(file) => Box::new(ParquetSink::new(file.path.clone(), table)),
    };
    Ok(sink)
}
