// src/merge/mod.rs

use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument, warn};

use crate::error::PipelineError;
use crate::table::{LongTable, MergedRow, MergedTable, ObservationKey, KEY_COLUMNS};

/// Outer-join `tables` on the key columns, left to right.
///
/// Rows come out in order of first appearance. A label value missing for a
/// key, or left empty in its source, becomes `0.0`, so a zero in the result
/// does not distinguish "reported zero" from "not reported".
#[instrument(level = "info", skip_all, fields(tables = tables.len()))]
pub fn merge(tables: &[LongTable]) -> Result<MergedTable, PipelineError> {
    if tables.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    check_labels(tables)?;

    let width = tables.len();
    let mut index: HashMap<ObservationKey, usize> = HashMap::new();
    let mut accumulated: Vec<(ObservationKey, Vec<Option<f64>>)> = Vec::new();

    for (slot, table) in tables.iter().enumerate() {
        let mut seen = HashSet::with_capacity(table.len());
        let mut duplicates = 0usize;

        for obs in &table.rows {
            let pos = *index.entry(obs.key.clone()).or_insert_with(|| {
                accumulated.push((obs.key.clone(), vec![None; width]));
                accumulated.len() - 1
            });
            if !seen.insert(pos) {
                duplicates += 1;
            }
            // a repeated key keeps its last value
            accumulated[pos].1[slot] = obs.value;
        }

        if duplicates > 0 {
            warn!(label = %table.label, duplicates, "repeated keys, kept last value");
        }
        debug!(label = %table.label, rows = accumulated.len(), "joined");
    }

    let rows = accumulated
        .into_iter()
        .map(|(key, values)| MergedRow {
            key,
            values: values.into_iter().map(|v| v.unwrap_or(0.0)).collect(),
        })
        .collect();

    Ok(MergedTable {
        labels: tables.iter().map(|t| t.label.clone()).collect(),
        rows,
    })
}

/// Labels become column names, so they must be distinct from each other and
/// from the key columns.
/// SQL stores fold identifier case, so `Deaths` collides with `deaths`
/// and `Date` with the `date` key column.
fn check_labels(tables: &[LongTable]) -> Result<(), PipelineError> {
    let mut seen: HashSet<String> = KEY_COLUMNS.iter().map(|c| c.to_lowercase()).collect();
    for table in tables {
        if !seen.insert(table.label.to_lowercase()) {
            return Err(PipelineError::LabelCollision(table.label.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Observation, Region};

    fn key(country: &str, date: &str) -> ObservationKey {
        ObservationKey {
            region: Region::new(None, country, Some(1.0), Some(2.0)),
            date: date.to_string(),
        }
    }

    fn table(label: &str, cells: &[(&str, &str, Option<f64>)]) -> LongTable {
        LongTable {
            label: label.to_string(),
            rows: cells
                .iter()
                .map(|&(country, date, value)| Observation {
                    key: key(country, date),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn three_single_region_tables() -> anyhow::Result<()> {
        let tables = vec![
            table("confirmed", &[("X", "d1", Some(1.0)), ("X", "d2", Some(2.0))]),
            table("deaths", &[("X", "d1", Some(0.0)), ("X", "d2", Some(1.0))]),
            table("recovered", &[("X", "d1", Some(0.0)), ("X", "d2", Some(0.0))]),
        ];
        let merged = merge(&tables)?;

        assert_eq!(merged.labels, vec!["confirmed", "deaths", "recovered"]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.rows[0].key, key("X", "d1"));
        assert_eq!(merged.rows[0].values, vec![1.0, 0.0, 0.0]);
        assert_eq!(merged.rows[1].key, key("X", "d2"));
        assert_eq!(merged.rows[1].values, vec![2.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn missing_date_is_filled_not_dropped() -> anyhow::Result<()> {
        let tables = vec![
            table("confirmed", &[("X", "d1", Some(5.0)), ("X", "d2", Some(7.0))]),
            table("deaths", &[("X", "d1", Some(1.0))]),
        ];
        let merged = merge(&tables)?;

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.value(&key("X", "d2"), "confirmed"), Some(7.0));
        assert_eq!(merged.value(&key("X", "d2"), "deaths"), Some(0.0));
        Ok(())
    }

    #[test]
    fn keys_only_in_later_tables_are_kept() -> anyhow::Result<()> {
        let tables = vec![
            table("confirmed", &[("X", "d1", Some(5.0))]),
            table("deaths", &[("Y", "d1", Some(2.0))]),
            table("recovered", &[("Z", "d9", None)]),
        ];
        let merged = merge(&tables)?;

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.rows[1].key, key("Y", "d1"));
        assert_eq!(merged.rows[1].values, vec![0.0, 2.0, 0.0]);
        // empty source cell is zero-filled too
        assert_eq!(merged.rows[2].values, vec![0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn every_key_appears_once() -> anyhow::Result<()> {
        let tables = vec![
            table("a", &[("X", "d1", Some(1.0)), ("Y", "d1", Some(1.0))]),
            table("b", &[("Y", "d1", Some(2.0)), ("X", "d2", Some(2.0))]),
            table("c", &[("X", "d1", Some(3.0)), ("X", "d2", Some(3.0))]),
        ];
        let merged = merge(&tables)?;

        let unique: HashSet<&ObservationKey> = merged.rows.iter().map(|r| &r.key).collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(merged.len(), 3);
        Ok(())
    }

    #[test]
    fn result_does_not_depend_on_table_order() -> anyhow::Result<()> {
        let a = table("a", &[("X", "d1", Some(1.0)), ("Y", "d1", Some(4.0))]);
        let b = table("b", &[("Y", "d1", Some(2.0)), ("X", "d2", Some(5.0))]);
        let c = table("c", &[("Z", "d3", Some(3.0))]);

        let forward = merge(&[a.clone(), b.clone(), c.clone()])?;
        let backward = merge(&[c, a, b])?;

        assert_eq!(forward.len(), backward.len());
        for row in &forward.rows {
            for label in ["a", "b", "c"] {
                assert_eq!(
                    forward.value(&row.key, label),
                    backward.value(&row.key, label),
                    "{label} at {:?}",
                    row.key
                );
            }
        }
        Ok(())
    }

    #[test]
    fn repeated_key_keeps_last_value() -> anyhow::Result<()> {
        let tables = vec![table(
            "confirmed",
            &[("X", "d1", Some(1.0)), ("X", "d1", Some(9.0))],
        )];
        let merged = merge(&tables)?;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.rows[0].values, vec![9.0]);
        Ok(())
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(merge(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn colliding_labels_are_rejected() {
        let dup = vec![table("deaths", &[]), table("deaths", &[])];
        assert!(matches!(merge(&dup), Err(PipelineError::LabelCollision(l)) if l == "deaths"));

        let shadow = vec![table("date", &[])];
        assert!(matches!(merge(&shadow), Err(PipelineError::LabelCollision(l)) if l == "date"));

        let case_only = vec![table("deaths", &[]), table("Deaths", &[])];
        assert!(matches!(merge(&case_only), Err(PipelineError::LabelCollision(l)) if l == "Deaths"));

        let shadow = vec![table("confirmed", &[]), table("Date", &[])];
        assert!(matches!(merge(&shadow), Err(PipelineError::LabelCollision(l)) if l == "Date"));

        let shadow = vec![table("LAT", &[])];
        assert!(matches!(merge(&shadow), Err(PipelineError::LabelCollision(l)) if l == "LAT"));
    }
}
