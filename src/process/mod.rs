// src/process/mod.rs

pub mod raw_table;

pub use raw_table::RawTable;

use reqwest::Client;
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::fetch::fetch_text;
use crate::sources::SourceRegistry;
use crate::table::{LongTable, Observation, ObservationKey};

impl RawTable {
    /// Unpivot into one row per (region, date), date-major like the source
    /// columns. The value column is named after `label`.
    pub fn melt(&self, label: &str) -> LongTable {
        let mut rows = Vec::with_capacity(self.regions.len() * self.dates.len());
        for (d, date) in self.dates.iter().enumerate() {
            for (region, values) in self.regions.iter().zip(&self.values) {
                rows.push(Observation {
                    key: ObservationKey {
                        region: region.clone(),
                        date: date.clone(),
                    },
                    value: values[d],
                });
            }
        }
        LongTable {
            label: label.to_string(),
            rows,
        }
    }
}

/// Fetch every source in registry order and reshape it to long form.
///
/// Fails on the first source that cannot be fetched or parsed; an empty
/// registry gives an empty result.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn reshape(
    client: &Client,
    sources: &SourceRegistry,
) -> Result<Vec<LongTable>, PipelineError> {
    let mut tables = Vec::with_capacity(sources.len());

    for source in sources.iter() {
        let label = source.label.as_str();
        info!(label, locator = %source.locator, "fetching");

        let text = fetch_text(client, &source.locator)
            .await
            .map_err(|e| PipelineError::retrieval(label, &source.locator, e))?;
        let raw = RawTable::parse(label, &source.locator, &text)?;
        let long = raw.melt(label);

        info!(
            label,
            regions = raw.regions.len(),
            dates = raw.dates.len(),
            rows = long.len(),
            "reshaped"
        );
        tables.push(long);
    }

    Ok(tables)
}
