use crate::pipeline::normalize::normalize;
use crate::types::{ColumnKey, Month, MonthValues};
use crate::workbook::Cell;
use tracing::debug;

/// Raw label spellings (after trimming and lowercasing) and the key each is stored under.
const LABELS: &[(&str, ColumnKey)] = &[
    ("jan", ColumnKey::Month(Month::Jan)),
    ("january", ColumnKey::Month(Month::Jan)),
    ("feb", ColumnKey::Month(Month::Feb)),
    ("february", ColumnKey::Month(Month::Feb)),
    ("mar", ColumnKey::Month(Month::Mar)),
    ("march", ColumnKey::Month(Month::Mar)),
    ("apr", ColumnKey::Month(Month::Apr)),
    ("april", ColumnKey::Month(Month::Apr)),
    ("may", ColumnKey::Month(Month::May)),
    ("jun", ColumnKey::Month(Month::Jun)),
    ("june", ColumnKey::Month(Month::Jun)),
    ("jul", ColumnKey::Month(Month::Jul)),
    ("july", ColumnKey::Month(Month::Jul)),
    ("aug", ColumnKey::Month(Month::Aug)),
    ("august", ColumnKey::Month(Month::Aug)),
    ("sep", ColumnKey::Month(Month::Sep)),
    ("sept", ColumnKey::Month(Month::Sep)),
    ("september", ColumnKey::Month(Month::Sep)),
    ("oct", ColumnKey::Month(Month::Oct)),
    ("october", ColumnKey::Month(Month::Oct)),
    ("nov", ColumnKey::Month(Month::Nov)),
    ("november", ColumnKey::Month(Month::Nov)),
    ("dec", ColumnKey::Month(Month::Dec)),
    ("december", ColumnKey::Month(Month::Dec)),
    ("average", ColumnKey::Aggregate),
    ("annual average", ColumnKey::Aggregate),
    ("avg", ColumnKey::Aggregate),
    // RPI publishes its yearly twelve-month figure under "change".
    ("change", ColumnKey::Aggregate),
    ("annual change", ColumnKey::Aggregate),
];

/// Lowercase, trim and collapse inner whitespace of a column label.
pub fn canonical_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Storage key for a column label, or `None` for labels the tables do not store.
pub fn column_key(label: &str) -> Option<ColumnKey> {
    let canonical = canonical_label(label);
    LABELS
        .iter()
        .find(|(spelling, _)| *spelling == canonical)
        .map(|(_, key)| *key)
}

/// Resolve every header label once; excluded and unrecognised columns map to `None`.
pub fn resolve_columns(header: &[String], excluded: &[usize]) -> Vec<Option<ColumnKey>> {
    header
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            if excluded.contains(&idx) {
                return None;
            }
            let key = column_key(label);
            if key.is_none() {
                debug!(column = idx, label = %label, "ignoring unrecognised column");
            }
            key
        })
        .collect()
}

/// Clean one worksheet row into month values and the optional aggregate.
///
/// Cells beyond the header width have no label and are dropped.
pub fn project(columns: &[Option<ColumnKey>], row: &[Cell]) -> MonthValues {
    let mut values = MonthValues::default();
    for (key, cell) in columns.iter().zip(row) {
        if let Some(key) = key {
            values.set(*key, normalize(cell));
        }
    }
    values
}
