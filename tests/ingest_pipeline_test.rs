use anyhow::Result;
use async_trait::async_trait;
use inflation_ingest::constants::{
    default_layouts, CPIH_SHEET_NAME, CPI_SHEET_NAME, RPI_OBSERVATIONS_SHEET_NAME,
    RPI_ONE_MONTH_SHEET_NAME, RPI_TWELVE_MONTH_SHEET_NAME,
};
use inflation_ingest::error::IngestError;
use inflation_ingest::pipeline::indicator::{IndicatorLayout, SheetLayout};
use inflation_ingest::pipeline::{ingest_workbook, run_ingestion};
use inflation_ingest::storage::{RunStatus, Store};
use inflation_ingest::types::{AggregateColumn, Indicator, Month, Variant};
use inflation_ingest::workbook::{Cell, Workbook, WorkbookSource, Worksheet};
use rust_xlsxwriter::{Workbook as XlsxWriter, XlsxError};
use std::sync::Mutex;
use tempfile::tempdir;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Serves a fixed payload, or a failing status when none is set.
struct StaticSource {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl StaticSource {
    fn new(bytes: Option<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    fn replace(&self, bytes: Vec<u8>) {
        *self.bytes.lock().unwrap() = Some(bytes);
    }
}

#[async_trait]
impl WorkbookSource for StaticSource {
    async fn fetch(&self) -> inflation_ingest::error::Result<Vec<u8>> {
        self.bytes
            .lock()
            .unwrap()
            .clone()
            .ok_or(IngestError::SourceUnavailable { status: 404 })
    }
}

/// Stacked CPI/CPIH sheet: three sections of 2019-2020, months `offset + 1..=offset + 12`.
fn write_stacked(book: &mut XlsxWriter, name: &str, offset: f64) -> Result<(), XlsxError> {
    let sheet = book.add_worksheet();
    sheet.set_name(name)?;
    sheet.write_string(0, 0, "Consumer Prices Index")?;
    for (i, month) in MONTHS.iter().enumerate() {
        sheet.write_string(5, 2 + i as u16, *month)?;
    }
    sheet.write_string(5, 14, "Average")?;
    sheet.write_string(6, 1, "2015=100")?;

    let mut row = 7;
    for section in 0..3 {
        if section > 0 {
            row += 1;
            sheet.write_string(row, 0, "Percentage change")?;
            row += 1;
        }
        for year in [2019u32, 2020] {
            sheet.write_string(row, 0, "CPI INDEX 00")?;
            sheet.write_number(row, 1, year)?;
            for m in 0..12u16 {
                sheet.write_number(row, 2 + m, offset + f64::from(m) + 1.0)?;
            }
            sheet.write_number(row, 14, offset + 6.5)?;
            row += 1;
        }
    }
    Ok(())
}

/// RPI sheet with the year in column 2 and a trailing aggregate labelled `aggregate`
/// (left unlabelled when empty).
fn write_rpi(
    book: &mut XlsxWriter,
    name: &str,
    header_row: u32,
    aggregate: &str,
    offset: f64,
) -> Result<(), XlsxError> {
    let sheet = book.add_worksheet();
    sheet.set_name(name)?;
    sheet.write_string(0, 0, "Retail Prices Index")?;
    sheet.write_string(header_row, 1, "per cent")?;
    for (i, month) in MONTHS.iter().enumerate() {
        sheet.write_string(header_row, 3 + i as u16, *month)?;
    }
    if !aggregate.is_empty() {
        sheet.write_string(header_row, 15, aggregate)?;
    }
    for (n, year) in [1987u32, 1988].into_iter().enumerate() {
        let row = header_row + 1 + n as u32;
        sheet.write_string(row, 0, "CHAW")?;
        sheet.write_number(row, 1, 0.5)?;
        sheet.write_number(row, 2, year)?;
        sheet.write_number(row, 3, offset + 1.0)?;
        sheet.write_string(row, 4, "..")?;
        sheet.write_string(row, 5, "-")?;
        for m in 3..12u16 {
            sheet.write_number(row, 3 + m, offset + f64::from(m) + 1.0)?;
        }
        sheet.write_number(row, 15, offset + 50.0)?;
    }
    sheet.write_string(header_row + 3, 0, "Source: Office for National Statistics")?;
    Ok(())
}

fn workbook_bytes(offset: f64) -> Result<Vec<u8>, XlsxError> {
    let mut book = XlsxWriter::new();
    write_stacked(&mut book, CPI_SHEET_NAME, offset)?;
    write_stacked(&mut book, CPIH_SHEET_NAME, offset + 100.0)?;
    write_rpi(&mut book, RPI_OBSERVATIONS_SHEET_NAME, 5, "Average", offset)?;
    write_rpi(&mut book, RPI_TWELVE_MONTH_SHEET_NAME, 6, "Change", offset)?;
    write_rpi(&mut book, RPI_ONE_MONTH_SHEET_NAME, 5, "", offset)?;
    book.save_to_buffer()
}

#[tokio::test]
async fn test_full_run_populates_every_table() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("inflation.db");
    let source = StaticSource::new(Some(workbook_bytes(0.0)?));

    let report = run_ingestion(&source, db_path.clone(), &default_layouts()).await?;
    assert_eq!(report.tables.len(), 9);
    assert_eq!(report.rows_written, 18);
    assert_eq!(report.workbook_sha256.len(), 64);

    let store = Store::open(&db_path)?;
    let obs = store.select_series(Indicator::Cpi, Variant::Observation, 1900)?;
    assert_eq!(obs.len(), 2);
    assert_eq!(obs[0].year, 2019);
    assert_eq!(obs[0].aggregate, Some((AggregateColumn::AnnualAverage, Some(6.5))));
    let months: Vec<_> = Month::ALL.iter().map(|m| obs[0].month(*m)).collect();
    let counting: Vec<_> = (1..=12).map(|v| Some(v as f64)).collect();
    assert_eq!(months, counting);

    let one = store.select_series(Indicator::Cpi, Variant::OneMonthPercentageChange, 2019)?;
    assert_eq!(one[0].aggregate, None);
    assert_eq!(one[0].month(Month::Jan), None);
    assert_eq!(one[0].month(Month::Feb), Some(1.0));
    assert_eq!(one[0].month(Month::Dec), Some(11.0));

    let cpih = store.select_series(Indicator::Cpih, Variant::TwelveMonthPercentageChange, 2020)?;
    assert_eq!(cpih.len(), 1);
    assert_eq!(cpih[0].aggregate, Some((AggregateColumn::AnnualChange, Some(106.5))));

    // RPI: ".." is absent, "-" is zero, "change" feeds annual_change.
    let rpi = store.select_series(Indicator::Rpi, Variant::Observation, 1900)?;
    assert_eq!(rpi.iter().map(|r| r.year).collect::<Vec<_>>(), vec![1987, 1988]);
    assert_eq!(rpi[0].month(Month::Jan), Some(1.0));
    assert_eq!(rpi[0].month(Month::Feb), None);
    assert_eq!(rpi[0].month(Month::Mar), Some(0.0));
    let rpi12 = store.select_series(Indicator::Rpi, Variant::TwelveMonthPercentageChange, 1900)?;
    assert_eq!(rpi12[0].aggregate, Some((AggregateColumn::AnnualChange, Some(50.0))));
    let rpi1 = store.select_series(Indicator::Rpi, Variant::OneMonthPercentageChange, 1900)?;
    assert_eq!(rpi1[0].month(Month::Feb), Some(1.0));
    assert_eq!(rpi1[0].month(Month::Mar), None);
    assert_eq!(rpi1[0].month(Month::Apr), Some(0.0));

    let runs = store.recent_runs(5)?;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Succeeded);
    assert_eq!(runs[0].rows_written, 18);
    Ok(())
}

#[tokio::test]
async fn test_rerun_is_idempotent_and_applies_revisions() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("inflation.db");
    let source = StaticSource::new(Some(workbook_bytes(0.0)?));
    let layouts = default_layouts();

    run_ingestion(&source, db_path.clone(), &layouts).await?;
    run_ingestion(&source, db_path.clone(), &layouts).await?;
    {
        let store = Store::open(&db_path)?;
        for table in Indicator::all_tables() {
            assert_eq!(store.row_count(&table)?, 2, "{}", table.name);
        }
    }

    source.replace(workbook_bytes(1000.0)?);
    run_ingestion(&source, db_path.clone(), &layouts).await?;

    let store = Store::open(&db_path)?;
    let obs = store.select_series(Indicator::Cpi, Variant::Observation, 2019)?;
    assert_eq!(obs.len(), 2);
    assert_eq!(obs[0].month(Month::Jan), Some(1001.0));
    assert_eq!(store.recent_runs(10)?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_source_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("inflation.db");
    let source = StaticSource::new(None);

    let err = run_ingestion(&source, db_path.clone(), &default_layouts())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::SourceUnavailable { status: 404 }));

    let store = Store::open(&db_path)?;
    assert_eq!(store.row_count(&Indicator::Cpi.table(Variant::Observation))?, 0);
    let runs = store.recent_runs(5)?;
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].workbook_sha256.is_none());
    Ok(())
}

#[tokio::test]
async fn test_missing_worksheet_aborts_before_any_write() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("inflation.db");
    let mut book = XlsxWriter::new();
    write_stacked(&mut book, CPI_SHEET_NAME, 0.0)?;
    let source = StaticSource::new(Some(book.save_to_buffer()?));

    let err = run_ingestion(&source, db_path.clone(), &default_layouts())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::SheetShape(_)));

    let store = Store::open(&db_path)?;
    for table in Indicator::all_tables() {
        assert_eq!(store.row_count(&table)?, 0);
    }
    let runs = store.recent_runs(5)?;
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].workbook_sha256.is_some());
    Ok(())
}

#[tokio::test]
async fn test_write_failure_in_later_table_rolls_back_whole_run() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("inflation.db");
    {
        // A pre-existing table without `feb` survives schema creation and rejects the upsert.
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.execute_batch(
            "CREATE TABLE cpi_one_month_percent_change (year INTEGER PRIMARY KEY, \"jan\" REAL);",
        )?;
    }
    let source = StaticSource::new(Some(workbook_bytes(0.0)?));

    let err = run_ingestion(&source, db_path.clone(), &default_layouts())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Persistence(_)), "{err}");

    let store = Store::open(&db_path)?;
    assert_eq!(store.row_count(&Indicator::Cpi.table(Variant::Observation))?, 0);
    assert_eq!(
        store.row_count(&Indicator::Cpi.table(Variant::TwelveMonthPercentageChange))?,
        0
    );
    let runs = store.recent_runs(5)?;
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].rows_written, 0);
    Ok(())
}

fn counting_row(year: f64) -> Vec<Cell> {
    let mut cells = vec![Cell::Empty, Cell::Number(year)];
    cells.extend((1..=12).map(|v| Cell::Number(v as f64)));
    cells.push(Cell::Number(6.5));
    cells
}

// Sections are assigned by position only: with two runs of years there is no
// third run, so nothing is derived for the one-month table and the run still succeeds.
#[test]
fn test_two_section_worksheet_leaves_one_month_table_empty() -> Result<()> {
    let mut header = vec![Cell::Empty, Cell::Empty];
    header.extend(MONTHS.iter().map(|m| Cell::text(m)));
    header.push(Cell::text("Average"));

    let mut workbook = Workbook::new();
    workbook.insert(Worksheet::new(
        "synthetic",
        vec![
            header,
            counting_row(2019.0),
            counting_row(2020.0),
            vec![Cell::text("Percentage change over 12 months")],
            counting_row(2019.0),
            counting_row(2020.0),
        ],
    ));
    let layouts = vec![(
        Indicator::Cpi,
        IndicatorLayout::Stacked(SheetLayout {
            sheet: "synthetic".to_string(),
            header_row: 0,
            year_column: 1,
            excluded_columns: vec![0, 1],
        }),
    )];

    let mut store = Store::open_in_memory()?;
    let summary = ingest_workbook(&mut store, &workbook, &layouts)?;
    assert_eq!(summary.rows_written, 4);

    let obs = store.select_series(Indicator::Cpi, Variant::Observation, 2019)?;
    assert_eq!(obs[0].aggregate, Some((AggregateColumn::AnnualAverage, Some(6.5))));
    assert_eq!(obs[0].month(Month::Dec), Some(12.0));
    let twelve = store.select_series(Indicator::Cpi, Variant::TwelveMonthPercentageChange, 2019)?;
    assert_eq!(twelve.len(), 2);
    assert!(store
        .select_series(Indicator::Cpi, Variant::OneMonthPercentageChange, 1900)?
        .is_empty());
    Ok(())
}
