// src/sink/parquet.rs

use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

use super::Sink;
use crate::error::PipelineError;
use crate::table::MergedTable;

/// Key-value metadata entry holding the RFC 3339 write time.
pub const LOADED_AT_KEY: &str = "loaded_at";

/// Snapshot of the merged table as a single Parquet file.
pub struct ParquetSink {
    path: PathBuf,
    table: String,
}

impl ParquetSink {
    pub fn new(path: impl Into<PathBuf>, table: &str) -> Self {
        ParquetSink {
            path: path.into(),
            table: table.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to `<path>.tmp` then rename over the destination. A failed
    /// write leaves any previous file untouched and removes the temp file.
    fn write(&self, table: &MergedTable) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let batch = table
            .to_record_batch()
            .context("building merged record batch")?;
        let temp_path = self.path.with_extension("tmp");

        let written = write_snapshot(&temp_path, &batch).and_then(|()| {
            fs::rename(&temp_path, &self.path).with_context(|| {
                format!(
                    "renaming {} -> {}",
                    temp_path.display(),
                    self.path.display()
                )
            })
        });
        if written.is_err() && temp_path.exists() {
            if let Err(e) = fs::remove_file(&temp_path) {
                warn!(path = %temp_path.display(), error = %e, "could not remove partial snapshot");
            }
        }
        written?;
        debug!(path = %self.path.display(), rows = batch.num_rows(), "wrote parquet");
        Ok(())
    }

    fn read(&self, labels: &[String]) -> Result<MergedTable> {
        let file =
            File::open(&self.path).with_context(|| format!("opening {}", self.path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(MergedTable::from_record_batches(labels, &batches)?)
    }
}

fn write_snapshot(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            LOADED_AT_KEY.to_string(),
            Utc::now().to_rfc3339(),
        )]))
        .build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context("creating Arrow writer")?;
    writer.write(batch).context("writing merged batch")?;
    writer.close().context("closing Arrow writer")?;
    Ok(())
}

#[async_trait]
impl Sink for ParquetSink {
    fn table(&self) -> &str {
        &self.table
    }

    #[instrument(level = "info", skip_all, fields(table = %self.table, rows = table.len()))]
    async fn replace_all(&self, table: &MergedTable) -> Result<(), PipelineError> {
        self.write(table)
            .map_err(|e| PipelineError::sink(&self.table, e))?;
        info!(path = %self.path.display(), "replaced");
        Ok(())
    }

    async fn read_all(&self, labels: &[String]) -> Result<MergedTable, PipelineError> {
        self.read(labels)
            .map_err(|e| PipelineError::sink(&self.table, e))
    }
}
