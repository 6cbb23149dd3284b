// src/sink/mysql.rs

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query_builder::Separated;
use sqlx::{QueryBuilder, Row};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::Sink;
use crate::config::MySqlOptions;
use crate::error::PipelineError;
use crate::table::{
    Coordinate, MergedRow, MergedTable, ObservationKey, Region, COUNTRY_REGION, DATE, KEY_COLUMNS,
    LAT, LONG, PROVINCE_STATE,
};

/// Bound parameters MySQL accepts in one prepared statement.
const MAX_PLACEHOLDERS: usize = 65_535;
const MAX_BATCH_ROWS: usize = 1_000;

/// Rows per INSERT statement for a table with `labels` value columns.
fn insert_batch_rows(labels: usize) -> usize {
    (MAX_PLACEHOLDERS / (KEY_COLUMNS.len() + labels)).clamp(1, MAX_BATCH_ROWS)
}

/// Writes to MySQL through a staging table that is swapped in with a single
/// `RENAME TABLE`, so readers see either the old or the new contents. A
/// failure to drop the swapped-out table after the rename is logged, not
/// returned, since the load itself has already succeeded.
pub struct MySqlSink {
    pool: MySqlPool,
    table: String,
}

impl MySqlSink {
    #[instrument(level = "info", skip(options), fields(host = %options.host, database = %options.database))]
    pub async fn connect(options: &MySqlOptions, table: &str) -> Result<Self, PipelineError> {
        let mut connect = MySqlConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .username(&options.user)
            .database(&options.database)
            .charset(&options.charset);
        if let Some(password) = &options.password {
            connect = connect.password(password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect)
            .await
            .map_err(|e| PipelineError::sink(table, e))?;
        info!("connected");

        Ok(MySqlSink {
            pool,
            table: table.to_string(),
        })
    }

    fn staging(&self) -> String {
        format!("{}__staging", self.table)
    }

    fn previous(&self) -> String {
        format!("{}__previous", self.table)
    }

    async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        debug!(sql, "execute");
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn load(&self, table: &MergedTable) -> Result<(), sqlx::Error> {
        let staging = self.staging();
        let live = quote_ident(&self.table);

        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&staging)))
            .await?;
        self.execute(&create_table_sql(&staging, &table.labels)).await?;

        let mut tx = self.pool.begin().await?;
        for chunk in table.rows.chunks(insert_batch_rows(table.labels.len())) {
            let mut insert = insert_prefix(&staging, &table.labels);
            insert.push_values(chunk, |b, row| push_row(b, row));
            insert.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!(rows = table.len(), staging = %staging, "staged");

        // swap: the live table must exist for the rename, so create it empty first
        self.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} LIKE {}",
            live,
            quote_ident(&staging)
        ))
        .await?;
        self.execute(&format!(
            "DROP TABLE IF EXISTS {}",
            quote_ident(&self.previous())
        ))
        .await?;
        self.execute(&format!(
            "RENAME TABLE {live} TO {previous}, {staging} TO {live}",
            live = live,
            previous = quote_ident(&self.previous()),
            staging = quote_ident(&staging),
        ))
        .await?;

        // the new rows are live from here on; a leftover copy is only logged
        let previous = self.previous();
        if let Err(e) = self
            .execute(&format!("DROP TABLE {}", quote_ident(&previous)))
            .await
        {
            warn!(table = %previous, error = %e, "could not drop the replaced table");
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for MySqlSink {
    fn table(&self) -> &str {
        &self.table
    }

    #[instrument(level = "info", skip_all, fields(table = %self.table, rows = table.len()))]
    async fn replace_all(&self, table: &MergedTable) -> Result<(), PipelineError> {
        self.load(table)
            .await
            .map_err(|e| PipelineError::sink(&self.table, e))?;
        info!("replaced");
        Ok(())
    }

    async fn read_all(&self, labels: &[String]) -> Result<MergedTable, PipelineError> {
        let sql = select_sql(&self.table, labels);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::sink(&self.table, e))?;

        let rows = rows
            .iter()
            .map(|row| decode_row(row, labels.len()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::sink(&self.table, e))?;
        Ok(MergedTable {
            labels: labels.to_vec(),
            rows,
        })
    }
}

fn decode_row(row: &MySqlRow, labels: usize) -> Result<MergedRow, sqlx::Error> {
    let province: Option<String> = row.try_get(0)?;
    let country: String = row.try_get(1)?;
    let lat: Option<f64> = row.try_get(2)?;
    let long: Option<f64> = row.try_get(3)?;
    let date: String = row.try_get(4)?;
    let values = (0..labels)
        .map(|i| row.try_get::<f64, _>(5 + i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MergedRow {
        key: ObservationKey {
            region: Region {
                province_state: province,
                country_region: country,
                lat: Coordinate(lat),
                long: Coordinate(long),
            },
            date,
        },
        values,
    })
}

/// Backtick-quote an identifier; column names such as `Province/State`
/// need it.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn create_table_sql(table: &str, labels: &[String]) -> String {
    let mut columns = vec![
        format!("{} TEXT NULL", quote_ident(PROVINCE_STATE)),
        format!("{} TEXT NOT NULL", quote_ident(COUNTRY_REGION)),
        format!("{} DOUBLE NULL", quote_ident(LAT)),
        format!("{} DOUBLE NULL", quote_ident(LONG)),
        format!("{} VARCHAR(32) NOT NULL", quote_ident(DATE)),
    ];
    columns.extend(
        labels
            .iter()
            .map(|label| format!("{} DOUBLE NOT NULL", quote_ident(label))),
    );
    format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", "))
}

fn column_list(labels: &[String]) -> String {
    [PROVINCE_STATE, COUNTRY_REGION, LAT, LONG, DATE]
        .iter()
        .copied()
        .chain(labels.iter().map(String::as_str))
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_prefix<'a>(table: &str, labels: &[String]) -> QueryBuilder<'a, MySql> {
    QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        quote_ident(table),
        column_list(labels)
    ))
}

/// Binds one row in column order: the five key columns, then the values.
fn push_row<'args>(mut b: Separated<'_, 'args, MySql, &'static str>, row: &'args MergedRow) {
    let region = &row.key.region;
    b.push_bind(region.province_state.as_deref())
        .push_bind(region.country_region.as_str())
        .push_bind(region.lat.0)
        .push_bind(region.long.0)
        .push_bind(row.key.date.as_str());
    for value in &row.values {
        b.push_bind(*value);
    }
}

pub fn select_sql(table: &str, labels: &[String]) -> String {
    format!("SELECT {} FROM {}", column_list(labels), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn labels() -> Vec<String> {
        vec!["confirmed".into(), "deaths".into(), "recovered".into()]
    }

    #[test]
    fn identifiers_are_backtick_quoted() {
        assert_eq!(quote_ident("Province/State"), "`Province/State`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn create_statement_keeps_column_names_verbatim() {
        let sql = create_table_sql("time_series_data", &labels());
        assert!(sql.starts_with("CREATE TABLE `time_series_data` ("));
        assert!(sql.contains("`Province/State` TEXT NULL"));
        assert!(sql.contains("`Country/Region` TEXT NOT NULL"));
        assert!(sql.contains("`Lat` DOUBLE NULL"));
        assert!(sql.contains("`recovered` DOUBLE NOT NULL"));
        assert!(!sql.to_lowercase().contains("index"));
    }

    #[test]
    fn insert_builder_emits_one_placeholder_per_cell() {
        let table = MergedTable {
            labels: labels(),
            rows: vec![
                MergedRow {
                    key: ObservationKey {
                        region: Region::new(None, "Chad", Some(15.45), Some(18.73)),
                        date: "1/22/20".into(),
                    },
                    values: vec![1.0, 0.0, 0.0],
                };
                2
            ],
        };
        let mut insert = insert_prefix("t", &table.labels);
        insert.push_values(&table.rows, |b, row| push_row(b, row));
        let sql = insert.into_sql();

        let columns = column_list(&table.labels).split(", ").count();
        assert_eq!(columns, 8);
        assert!(sql.starts_with("INSERT INTO `t` (`Province/State`, `Country/Region`"));
        assert_eq!(sql.matches('?').count(), table.rows.len() * columns);
        assert_eq!(sql.matches("(?, ?, ?, ?, ?, ?, ?, ?)").count(), table.rows.len());
    }

    #[test]
    fn insert_batches_stay_under_the_placeholder_limit() {
        assert_eq!(insert_batch_rows(3), MAX_BATCH_ROWS);
        for labels in [0, 3, 60, 61, 200, 5_000] {
            let rows = insert_batch_rows(labels);
            assert!(rows >= 1);
            assert!(rows * (KEY_COLUMNS.len() + labels) <= MAX_PLACEHOLDERS);
        }
        assert_eq!(insert_batch_rows(200), MAX_PLACEHOLDERS / 205);
    }

    #[test]
    fn select_lists_keys_then_labels() {
        assert_eq!(
            select_sql("t", &["deaths".to_string()]),
            "SELECT `Province/State`, `Country/Region`, `Lat`, `Long`, `date`, `deaths` FROM `t`"
        );
    }

    /// Needs a disposable MySQL database: set `COVID_INGEST_MYSQL_TEST` to
    /// `host:port:user:password:database` and run with `--ignored`.
    #[tokio::test]
    #[ignore]
    async fn round_trip_against_live_server() -> anyhow::Result<()> {
        let target = env::var("COVID_INGEST_MYSQL_TEST")?;
        let parts: Vec<&str> = target.split(':').collect();
        anyhow::ensure!(parts.len() == 5, "expected host:port:user:password:database");
        let options = MySqlOptions {
            host: parts[0].to_string(),
            port: parts[1].parse()?,
            user: parts[2].to_string(),
            password: Some(parts[3].to_string()),
            database: parts[4].to_string(),
            ..MySqlOptions::default()
        };
        let sink = MySqlSink::connect(&options, "covid_ingest_round_trip").await?;

        let table = MergedTable {
            labels: labels(),
            rows: vec![MergedRow {
                key: ObservationKey {
                    region: Region::new(Some("Ontario"), "Canada", None, None),
                    date: "1/22/20".into(),
                },
                values: vec![3.0, 1.0, 0.0],
            }],
        };
        // twice: the second write replaces the first
        sink.replace_all(&table).await?;
        sink.replace_all(&table).await?;

        let back = sink.read_all(&table.labels).await?;
        assert_eq!(back.sorted(), table.sorted());
        Ok(())
    }
}
