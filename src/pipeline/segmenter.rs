//! Splits a worksheet that stacks several same-shaped tables into its sections.
//!
//! Sections are contiguous runs of rows whose year cell is valid; any number of
//! title, blank or footnote rows separate them.

use crate::pipeline::normalize::year_of;
use crate::pipeline::projector::{project, resolve_columns};
use crate::types::YearSeries;
use crate::workbook::Table;
use tracing::warn;

/// Sections a stacked worksheet publishes: observation, twelve-month, one-month.
pub const SECTION_COUNT: usize = 3;

pub type Sections = [YearSeries; SECTION_COUNT];

/// Run-length state over the year-validity signal of consecutive rows.
#[derive(Debug, Clone, Copy)]
pub struct SectionTracker {
    section: Option<usize>,
    last_row_valid: bool,
}

impl Default for SectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionTracker {
    pub fn new() -> Self {
        Self {
            section: None,
            last_row_valid: false,
        }
    }

    /// Feed the next row's validity; returns the section a valid row belongs to.
    ///
    /// The section index only advances on an invalid→valid transition, which
    /// includes a valid first row.
    pub fn observe(&mut self, valid: bool) -> Option<usize> {
        if valid && !self.last_row_valid {
            self.section = Some(self.section.map_or(0, |s| s + 1));
        }
        self.last_row_valid = valid;
        if valid {
            self.section
        } else {
            None
        }
    }
}

/// Partition worksheet rows into the three stacked sections, keyed by year.
///
/// Runs after the third are discarded. A year repeated within a section keeps
/// the later row.
pub fn segment(table: &Table<'_>, year_column: usize, excluded: &[usize]) -> Sections {
    let columns = resolve_columns(&table.header, excluded);
    let mut sections: Sections = Default::default();
    let mut tracker = SectionTracker::new();
    let mut discarded = 0usize;

    for row in table.rows {
        let year = row.get(year_column).and_then(year_of);
        let Some(section) = tracker.observe(year.is_some()) else {
            continue;
        };
        let Some(year) = year else { continue };
        match sections.get_mut(section) {
            Some(series) => {
                if series.insert(year, project(&columns, row)).is_some() {
                    warn!(year, section, "year repeated within section, keeping later row");
                }
            }
            None => discarded += 1,
        }
    }

    if discarded > 0 {
        warn!(rows = discarded, "discarded rows beyond the third section");
    }
    sections
}

/// Collect every valid-year row of a single-table worksheet.
pub fn collect(table: &Table<'_>, year_column: usize, excluded: &[usize]) -> YearSeries {
    let columns = resolve_columns(&table.header, excluded);
    let mut series = YearSeries::new();
    for row in table.rows {
        if let Some(year) = row.get(year_column).and_then(year_of) {
            if series.insert(year, project(&columns, row)).is_some() {
                warn!(year, "year repeated in worksheet, keeping later row");
            }
        }
    }
    series
}
