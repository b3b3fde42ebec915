use crate::error::{IngestError, Result};
use crate::pipeline::derive::derive_one_month_change;
use crate::pipeline::projector::resolve_columns;
use crate::pipeline::segmenter::{collect, segment};
use crate::types::{ColumnKey, Indicator, Variant, YearSeries};
use crate::workbook::{Table, Workbook};
use tracing::{info, instrument};

/// Where a table lives on a worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetLayout {
    pub sheet: String,
    /// 0-based row holding the column labels.
    pub header_row: usize,
    pub year_column: usize,
    /// Label and year columns, never projected.
    pub excluded_columns: Vec<usize>,
}

impl SheetLayout {
    fn table<'w>(&self, workbook: &'w Workbook) -> Result<Table<'w>> {
        let table = workbook.worksheet(&self.sheet)?.table(self.header_row)?;
        if self.year_column >= table.header.len() {
            return Err(IngestError::SheetShape(format!(
                "sheet '{}' has {} columns, year column {} is missing",
                self.sheet,
                table.header.len(),
                self.year_column
            )));
        }
        let columns = resolve_columns(&table.header, &self.excluded_columns);
        if !columns.iter().any(|c| matches!(c, Some(ColumnKey::Month(_)))) {
            return Err(IngestError::SheetShape(format!(
                "sheet '{}' header row {} has no month columns",
                self.sheet, self.header_row
            )));
        }
        Ok(table)
    }
}

/// How an indicator's three variants are laid out in the workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorLayout {
    /// One worksheet stacking observation, twelve-month and one-month sections.
    Stacked(SheetLayout),
    /// One worksheet per variant.
    Separate {
        observation: SheetLayout,
        twelve_month: SheetLayout,
        one_month: SheetLayout,
    },
}

impl IndicatorLayout {
    pub fn sheet_names(&self) -> Vec<&str> {
        match self {
            IndicatorLayout::Stacked(layout) => vec![layout.sheet.as_str()],
            IndicatorLayout::Separate {
                observation,
                twelve_month,
                one_month,
            } => vec![
                observation.sheet.as_str(),
                twelve_month.sheet.as_str(),
                one_month.sheet.as_str(),
            ],
        }
    }
}

/// The three cleaned series of one indicator, ready to upsert.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub observation: YearSeries,
    pub twelve_month: YearSeries,
    pub one_month: YearSeries,
}

impl IndicatorSeries {
    pub fn get(&self, variant: Variant) -> &YearSeries {
        match variant {
            Variant::Observation => &self.observation,
            Variant::TwelveMonthPercentageChange => &self.twelve_month,
            Variant::OneMonthPercentageChange => &self.one_month,
        }
    }
}

/// Extract an indicator's series from the workbook without touching storage.
///
/// Every sheet is validated before any series is built, so a shape error
/// leaves nothing half-extracted.
#[instrument(skip_all, fields(indicator = %indicator))]
pub fn extract_indicator(
    workbook: &Workbook,
    indicator: Indicator,
    layout: &IndicatorLayout,
) -> Result<IndicatorSeries> {
    let series = match layout {
        IndicatorLayout::Stacked(sheet) => {
            let table = sheet.table(workbook)?;
            let [observation, twelve_month, one_month_raw] =
                segment(&table, sheet.year_column, &sheet.excluded_columns);
            IndicatorSeries {
                observation,
                twelve_month,
                one_month: derive_one_month_change(&one_month_raw),
            }
        }
        IndicatorLayout::Separate {
            observation,
            twelve_month,
            one_month,
        } => {
            let obs_table = observation.table(workbook)?;
            let twelve_table = twelve_month.table(workbook)?;
            let one_table = one_month.table(workbook)?;
            IndicatorSeries {
                observation: collect(&obs_table, observation.year_column, &observation.excluded_columns),
                twelve_month: collect(
                    &twelve_table,
                    twelve_month.year_column,
                    &twelve_month.excluded_columns,
                ),
                one_month: derive_one_month_change(&collect(
                    &one_table,
                    one_month.year_column,
                    &one_month.excluded_columns,
                )),
            }
        }
    };

    info!(
        observation = series.observation.len(),
        twelve_month = series.twelve_month.len(),
        one_month = series.one_month.len(),
        "extracted indicator"
    );
    Ok(series)
}
