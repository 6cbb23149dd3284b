// src/table/mod.rs

pub mod arrow;

use std::hash::{Hash, Hasher};

pub const PROVINCE_STATE: &str = "Province/State";
pub const COUNTRY_REGION: &str = "Country/Region";
pub const LAT: &str = "Lat";
pub const LONG: &str = "Long";
pub const DATE: &str = "date";

/// Identifying columns every raw table starts with, in order.
pub const ID_COLUMNS: [&str; 4] = [PROVINCE_STATE, COUNTRY_REGION, LAT, LONG];

/// Join key of the long and merged tables.
pub const KEY_COLUMNS: [&str; 5] = [PROVINCE_STATE, COUNTRY_REGION, LAT, LONG, DATE];

/// A latitude or longitude that can be used as a join key.
///
/// Equality is on the bit pattern of the parsed value, with `-0.0` folded
/// into `0.0`; two missing coordinates are equal.
#[derive(Debug, Clone, Copy)]
pub struct Coordinate(pub Option<f64>);

impl Coordinate {
    fn key_bits(&self) -> Option<u64> {
        self.0.map(|v| {
            let v = if v == 0.0 { 0.0f64 } else { v };
            v.to_bits()
        })
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.key_bits() == other.key_bits()
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_bits().hash(state);
    }
}

/// The identifying part of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub province_state: Option<String>,
    pub country_region: String,
    pub lat: Coordinate,
    pub long: Coordinate,
}

impl Region {
    pub fn new(
        province_state: Option<&str>,
        country_region: &str,
        lat: Option<f64>,
        long: Option<f64>,
    ) -> Self {
        Region {
            province_state: province_state.map(str::to_string),
            country_region: country_region.to_string(),
            lat: Coordinate(lat),
            long: Coordinate(long),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservationKey {
    pub region: Region,
    pub date: String,
}

/// One row of a long table. `None` is an empty cell in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub key: ObservationKey,
    pub value: Option<f64>,
}

/// A reshaped source: one row per (region, date).
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    pub label: String,
    pub rows: Vec<Observation>,
}

impl LongTable {
    pub fn column_names(&self) -> Vec<&str> {
        KEY_COLUMNS
            .iter()
            .copied()
            .chain(std::iter::once(self.label.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub key: ObservationKey,
    /// One value per label, aligned with `MergedTable::labels`.
    pub values: Vec<f64>,
}

/// Outer join of all long tables with absent values set to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTable {
    pub labels: Vec<String>,
    pub rows: Vec<MergedRow>,
}

impl MergedTable {
    pub fn column_names(&self) -> Vec<&str> {
        KEY_COLUMNS
            .iter()
            .copied()
            .chain(self.labels.iter().map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `label` for `key`, if both exist.
    pub fn value(&self, key: &ObservationKey, label: &str) -> Option<f64> {
        let slot = self.labels.iter().position(|l| l == label)?;
        self.rows
            .iter()
            .find(|r| &r.key == key)
            .map(|r| r.values[slot])
    }

    /// Rows sorted by key text, for order-insensitive comparison.
    pub fn sorted(&self) -> MergedTable {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| sort_key(&a.key).cmp(&sort_key(&b.key)));
        MergedTable {
            labels: self.labels.clone(),
            rows,
        }
    }
}

fn sort_key(key: &ObservationKey) -> (String, Option<&str>, String, String, &str) {
    (
        key.region.country_region.clone(),
        key.region.province_state.as_deref(),
        format!("{:?}", key.region.lat.0),
        format!("{:?}", key.region.long.0),
        key.date.as_str(),
    )
}
