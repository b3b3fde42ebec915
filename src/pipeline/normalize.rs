//! Cell-level cleaning: the placeholder vocabulary of the published tables and
//! the year predicate that decides which rows carry data.

use crate::workbook::Cell;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// Convert a raw cell into a number, or `None` when the cell holds no value.
///
/// `-` is a published zero and `..` marks a figure that is not available.
/// Anything that does not parse as a finite number is treated as absent.
pub fn normalize(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Empty => None,
        Cell::Number(n) => n.is_finite().then_some(*n),
        Cell::Text(raw) => match raw.trim() {
            "" | ".." => None,
            "-" => Some(0.0),
            text => text.parse::<f64>().ok().filter(|n| n.is_finite()),
        },
    }
}

/// The calendar year held by a cell, if it is a whole number in `[1900, 2100]`.
pub fn year_of(cell: &Cell) -> Option<i32> {
    let year = match cell {
        Cell::Empty => return None,
        Cell::Number(n) => {
            if !n.is_finite() || n.fract() != 0.0 {
                return None;
            }
            *n as i64
        }
        Cell::Text(raw) => {
            let text = raw.trim();
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            text.parse::<i64>().ok()?
        }
    };
    (i64::from(MIN_YEAR)..=i64::from(MAX_YEAR))
        .contains(&year)
        .then_some(year as i32)
}

pub fn is_valid_year(cell: &Cell) -> bool {
    year_of(cell).is_some()
}
