// src/sink/duck.rs

use async_trait::async_trait;
use duckdb::{Connection, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use super::Sink;
use crate::error::PipelineError;
use crate::table::{
    Coordinate, MergedRow, MergedTable, ObservationKey, Region, COUNTRY_REGION, DATE, LAT, LONG,
    PROVINCE_STATE,
};

/// DuckDB database file (or in-memory database) holding the merged table.
pub struct DuckDbSink {
    conn: Mutex<Connection>,
    table: String,
}

impl DuckDbSink {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, PipelineError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| PipelineError::sink(table, e))?;
        Ok(Self::with_connection(conn, table))
    }

    /// Open a DuckDB in‐memory database
    pub fn open_in_memory(table: &str) -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory().map_err(|e| PipelineError::sink(table, e))?;
        Ok(Self::with_connection(conn, table))
    }

    fn with_connection(conn: Connection, table: &str) -> Self {
        DuckDbSink {
            conn: Mutex::new(conn),
            table: table.to_string(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PipelineError> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::sink(&self.table, "duckdb connection lock poisoned"))
    }

    /// Recreate the table and append every row inside one transaction.
    fn write(&self, conn: &mut Connection, table: &MergedTable) -> duckdb::Result<()> {
        let tx = conn.transaction()?;
        tx.execute_batch(&create_or_replace_sql(&self.table, &table.labels))?;
        {
            let mut appender = tx.appender(&self.table)?;
            for row in &table.rows {
                let region = &row.key.region;
                let mut params: Vec<&dyn ToSql> = vec![
                    &region.province_state,
                    &region.country_region,
                    &region.lat.0,
                    &region.long.0,
                    &row.key.date,
                ];
                params.extend(row.values.iter().map(|v| v as &dyn ToSql));
                appender.append_row(&params[..])?;
            }
            appender.flush()?;
        }
        tx.commit()
    }

    fn read(&self, conn: &Connection, labels: &[String]) -> duckdb::Result<Vec<MergedRow>> {
        let mut stmt = conn.prepare(&select_sql(&self.table, labels))?;
        let rows = stmt.query_map([], |row| {
            let values = (0..labels.len())
                .map(|i| row.get::<_, f64>(5 + i))
                .collect::<duckdb::Result<Vec<_>>>()?;
            Ok(MergedRow {
                key: ObservationKey {
                    region: Region {
                        province_state: row.get(0)?,
                        country_region: row.get(1)?,
                        lat: Coordinate(row.get(2)?),
                        long: Coordinate(row.get(3)?),
                    },
                    date: row.get(4)?,
                },
                values,
            })
        })?;
        rows.collect()
    }
}

#[async_trait]
impl Sink for DuckDbSink {
    fn table(&self) -> &str {
        &self.table
    }

    #[instrument(level = "info", skip_all, fields(table = %self.table, rows = table.len()))]
    async fn replace_all(&self, table: &MergedTable) -> Result<(), PipelineError> {
        let mut conn = self.lock()?;
        self.write(&mut conn, table)
            .map_err(|e| PipelineError::sink(&self.table, e))?;
        info!("replaced");
        Ok(())
    }

    async fn read_all(&self, labels: &[String]) -> Result<MergedTable, PipelineError> {
        let conn = self.lock()?;
        let rows = self
            .read(&conn, labels)
            .map_err(|e| PipelineError::sink(&self.table, e))?;
        debug!(rows = rows.len(), "read back");
        Ok(MergedTable {
            labels: labels.to_vec(),
            rows,
        })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_or_replace_sql(table: &str, labels: &[String]) -> String {
    let mut columns = vec![
        format!("{} VARCHAR", quote_ident(PROVINCE_STATE)),
        format!("{} VARCHAR NOT NULL", quote_ident(COUNTRY_REGION)),
        format!("{} DOUBLE", quote_ident(LAT)),
        format!("{} DOUBLE", quote_ident(LONG)),
        format!("{} VARCHAR NOT NULL", quote_ident(DATE)),
    ];
    columns.extend(
        labels
            .iter()
            .map(|label| format!("{} DOUBLE NOT NULL", quote_ident(label))),
    );
    format!(
        "CREATE OR REPLACE TABLE {} ({});",
        quote_ident(table),
        columns.join(", ")
    )
}

fn select_sql(table: &str, labels: &[String]) -> String {
    let columns = [PROVINCE_STATE, COUNTRY_REGION, LAT, LONG, DATE]
        .iter()
        .copied()
        .chain(labels.iter().map(String::as_str))
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", columns, quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn table(values: &[(&str, Option<&str>, &str, [f64; 2])]) -> MergedTable {
        MergedTable {
            labels: vec!["confirmed".into(), "deaths".into()],
            rows: values
                .iter()
                .map(|&(country, province, date, v)| MergedRow {
                    key: ObservationKey {
                        region: Region::new(province, country, Some(-35.4735), None),
                        date: date.to_string(),
                    },
                    values: v.to_vec(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn round_trip_in_memory() -> Result<()> {
        let sink = DuckDbSink::open_in_memory("time_series_data")?;
        let merged = table(&[
            ("Australia", Some("Australian Capital Territory"), "1/22/20", [1.0, 0.0]),
            ("Chad", None, "1/22/20", [0.0, 0.0]),
            ("Chad", None, "1/23/20", [2.0, 1.0]),
        ]);

        sink.replace_all(&merged).await?;
        let back = sink.read_all(&merged.labels).await?;
        assert_eq!(back.sorted(), merged.sorted());
        Ok(())
    }

    #[tokio::test]
    async fn second_write_replaces_the_first() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("covid.duckdb");

        let sink = DuckDbSink::open(&path, "time_series_data")?;
        sink.replace_all(&table(&[
            ("Chad", None, "1/22/20", [1.0, 0.0]),
            ("Chad", None, "1/23/20", [2.0, 0.0]),
        ]))
        .await?;
        let second = table(&[("Peru", None, "1/22/20", [5.0, 1.0])]);
        sink.replace_all(&second).await?;
        drop(sink);

        // reopen to make sure the replacement was committed to disk
        let sink = DuckDbSink::open(&path, "time_series_data")?;
        let back = sink.read_all(&second.labels).await?;
        assert_eq!(back, second);
        Ok(())
    }

    #[test]
    fn create_statement_quotes_columns() {
        let sql = create_or_replace_sql("t", &["confirmed".to_string()]);
        assert!(sql.starts_with("CREATE OR REPLACE TABLE \"t\""));
        assert!(sql.contains("\"Province/State\" VARCHAR,"));
        assert!(sql.contains("\"confirmed\" DOUBLE NOT NULL"));
    }
}
