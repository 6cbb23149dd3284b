// src/table/arrow.rs

use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use super::{
    Coordinate, MergedRow, MergedTable, ObservationKey, Region, COUNTRY_REGION, DATE, LAT, LONG,
    PROVINCE_STATE,
};

/// Arrow schema of a merged table with the given value columns.
///
/// - Province/State → Utf8, nullable
/// - Country/Region → Utf8
/// - Lat, Long      → Float64, nullable
/// - date           → Utf8
/// - labels         → Float64
pub fn merged_schema(labels: &[String]) -> Arc<ArrowSchema> {
    let mut fields = vec![
        Field::new(PROVINCE_STATE, DataType::Utf8, true),
        Field::new(COUNTRY_REGION, DataType::Utf8, false),
        Field::new(LAT, DataType::Float64, true),
        Field::new(LONG, DataType::Float64, true),
        Field::new(DATE, DataType::Utf8, false),
    ];
    fields.extend(
        labels
            .iter()
            .map(|label| Field::new(label, DataType::Float64, false)),
    );
    Arc::new(ArrowSchema::new(fields))
}

impl MergedTable {
    /// Columnar copy of the table, one array per column.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let rows = &self.rows;

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter(
                rows.iter().map(|r| r.key.region.province_state.as_deref()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.key.region.country_region.as_str()),
            )),
            Arc::new(Float64Array::from_iter(
                rows.iter().map(|r| r.key.region.lat.0),
            )),
            Arc::new(Float64Array::from_iter(
                rows.iter().map(|r| r.key.region.long.0),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.key.date.as_str()),
            )),
        ];
        for slot in 0..self.labels.len() {
            columns.push(Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.values[slot]),
            )));
        }

        RecordBatch::try_new(merged_schema(&self.labels), columns)
    }

    /// Rebuild a table from batches laid out as `merged_schema(labels)`.
    /// Columns are looked up by name, so extra columns are ignored.
    pub fn from_record_batches(
        labels: &[String],
        batches: &[RecordBatch],
    ) -> Result<MergedTable, ArrowError> {
        let mut rows = Vec::new();

        for batch in batches {
            let province = string_column(batch, PROVINCE_STATE)?;
            let country = string_column(batch, COUNTRY_REGION)?;
            let lat = float_column(batch, LAT)?;
            let long = float_column(batch, LONG)?;
            let date = string_column(batch, DATE)?;
            let values = labels
                .iter()
                .map(|label| float_column(batch, label))
                .collect::<Result<Vec<_>, _>>()?;

            for row in 0..batch.num_rows() {
                let region = Region {
                    province_state: (!province.is_null(row))
                        .then(|| province.value(row).to_string()),
                    country_region: country.value(row).to_string(),
                    lat: Coordinate((!lat.is_null(row)).then(|| lat.value(row))),
                    long: Coordinate((!long.is_null(row)).then(|| long.value(row))),
                };
                rows.push(MergedRow {
                    key: ObservationKey {
                        region,
                        date: date.value(row).to_string(),
                    },
                    values: values.iter().map(|col| col.value(row)).collect(),
                });
            }
        }

        Ok(MergedTable {
            labels: labels.to_vec(),
            rows,
        })
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, ArrowError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| ArrowError::SchemaError(format!("expected Utf8 column `{}`", name)))
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array, ArrowError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| ArrowError::SchemaError(format!("expected Float64 column `{}`", name)))
}
