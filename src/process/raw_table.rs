// src/process/raw_table.rs

use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{debug, trace, warn};

use crate::error::{BoxError, PipelineError};
use crate::sources::Locator;
use crate::table::{Region, ID_COLUMNS};

/// Header format of the date columns, e.g. `1/22/20`.
const DATE_HEADER_FORMAT: &str = "%m/%d/%y";

/// A source table in wide form: one row per region, one column per date.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Every header after the four identifying columns, verbatim.
    pub dates: Vec<String>,
    pub regions: Vec<Region>,
    /// `values[r][d]` is the cell of region `r` under `dates[d]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl RawTable {
    /// Parse CSV text with a header row.
    ///
    /// The first four headers must be the identifying columns, spelled
    /// exactly; every later header is a date column. Rows must have as many
    /// fields as the header.
    pub fn parse(label: &str, locator: &Locator, text: &str) -> Result<RawTable, PipelineError> {
        let malformed = |e: BoxError| PipelineError::retrieval(label, locator, e);

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| malformed(e.into()))?
            .iter()
            .map(str::to_string)
            .collect();
        check_id_columns(label, &headers)?;

        let dates: Vec<String> = headers[ID_COLUMNS.len()..].to_vec();
        for date in &dates {
            if NaiveDate::parse_from_str(date, DATE_HEADER_FORMAT).is_err() {
                warn!(label, column = %date, "value column header is not a date");
            }
        }

        let mut regions = Vec::new();
        let mut values = Vec::new();
        for (idx, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| malformed(e.into()))?;
            // header is line 1
            let line = idx + 2;

            let region = Region::new(
                non_empty(&record[0]),
                &record[1],
                parse_number(&record[2]).map_err(|e| malformed(cell_error(line, &headers[2], e)))?,
                parse_number(&record[3]).map_err(|e| malformed(cell_error(line, &headers[3], e)))?,
            );
            let row = record
                .iter()
                .enumerate()
                .skip(ID_COLUMNS.len())
                .map(|(col, cell)| {
                    parse_number(cell).map_err(|e| malformed(cell_error(line, &headers[col], e)))
                })
                .collect::<Result<Vec<_>, _>>()?;

            trace!(label, line, country = %region.country_region, "parsed row");
            regions.push(region);
            values.push(row);
        }

        debug!(label, rows = regions.len(), dates = dates.len(), "parsed raw table");
        Ok(RawTable {
            dates,
            regions,
            values,
        })
    }
}

/// The identifying columns must all be present and occupy the first four slots.
fn check_id_columns(label: &str, headers: &[String]) -> Result<(), PipelineError> {
    for (pos, &column) in ID_COLUMNS.iter().enumerate() {
        if headers.get(pos).map(String::as_str) != Some(column) {
            return Err(PipelineError::SchemaMismatch {
                label: label.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn non_empty(cell: &str) -> Option<&str> {
    if cell.is_empty() {
        None
    } else {
        Some(cell)
    }
}

fn parse_number(cell: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        trimmed.parse::<f64>().map(Some)
    }
}

fn cell_error(line: usize, column: &str, err: std::num::ParseFloatError) -> BoxError {
    format!("line {}, column `{}`: {}", line, column, err).into()
}
