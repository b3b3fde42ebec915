//! Source locations and worksheet layouts of the ONS consumer price inflation
//! reference tables workbook.
use crate::pipeline::indicator::{IndicatorLayout, SheetLayout};
use crate::types::Indicator;

pub const WORKBOOK_URL: &str = "https://www.ons.gov.uk/file?uri=/economy/inflationandpriceindices/datasets/consumerpriceinflation/current/consumerpriceinflationdetailedreferencetables.xlsx";

pub const CPI_SHEET_NAME: &str = "Table 15a, 15b, 15c";
pub const CPIH_SHEET_NAME: &str = "Table 6a, 6b, 6c";
pub const RPI_OBSERVATIONS_SHEET_NAME: &str = "Table 23";
pub const RPI_TWELVE_MONTH_SHEET_NAME: &str = "Table 24";
pub const RPI_ONE_MONTH_SHEET_NAME: &str = "Table 25";

// Stacked CPI/CPIH sheets: label in column 0, year in column 1.
const STACKED_HEADER_ROW: usize = 5;
const STACKED_YEAR_COLUMN: usize = 1;

// RPI sheets keep the year in column 2.
const RPI_YEAR_COLUMN: usize = 2;

pub const DEFAULT_DB_PATH: &str = "data/inflation.db";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_LOG_DIR: &str = "logs";

fn stacked(sheet: &str) -> IndicatorLayout {
    IndicatorLayout::Stacked(SheetLayout {
        sheet: sheet.to_string(),
        header_row: STACKED_HEADER_ROW,
        year_column: STACKED_YEAR_COLUMN,
        excluded_columns: vec![0, STACKED_YEAR_COLUMN],
    })
}

fn rpi_sheet(sheet: &str, header_row: usize) -> SheetLayout {
    SheetLayout {
        sheet: sheet.to_string(),
        header_row,
        year_column: RPI_YEAR_COLUMN,
        excluded_columns: vec![0, RPI_YEAR_COLUMN],
    }
}

/// Layout of each indicator in the published workbook.
pub fn default_layout(indicator: Indicator) -> IndicatorLayout {
    match indicator {
        Indicator::Cpi => stacked(CPI_SHEET_NAME),
        Indicator::Cpih => stacked(CPIH_SHEET_NAME),
        Indicator::Rpi => IndicatorLayout::Separate {
            observation: rpi_sheet(RPI_OBSERVATIONS_SHEET_NAME, 5),
            twelve_month: rpi_sheet(RPI_TWELVE_MONTH_SHEET_NAME, 6),
            one_month: rpi_sheet(RPI_ONE_MONTH_SHEET_NAME, 5),
        },
    }
}

/// All indicators with their published layouts, in processing order.
pub fn default_layouts() -> Vec<(Indicator, IndicatorLayout)> {
    Indicator::ALL
        .into_iter()
        .map(|indicator| (indicator, default_layout(indicator)))
        .collect()
}
