//! Extraction and normalization engine: worksheet rows in, upserted series out.

pub mod derive;
pub mod indicator;
pub mod normalize;
pub mod projector;
pub mod segmenter;

use crate::error::Result;
use crate::pipeline::indicator::{extract_indicator, IndicatorLayout, IndicatorSeries};
use crate::storage::{IngestRun, RunStatus, Store};
use crate::types::{Indicator, Variant};
use crate::workbook::{Workbook, WorkbookSource};
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Rows written to one table during a run.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: &'static str,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub rows_written: usize,
    pub tables: Vec<TableSummary>,
}

/// Outcome of a full run, as reported to the trigger surface.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: String,
    pub workbook_sha256: String,
    pub rows_written: usize,
    pub tables: Vec<TableSummary>,
}

/// Every worksheet a set of layouts reads.
pub fn required_sheets(layouts: &[(Indicator, IndicatorLayout)]) -> Vec<&str> {
    let mut names: Vec<&str> = layouts
        .iter()
        .flat_map(|(_, layout)| layout.sheet_names())
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Extract every indicator, then upsert all series in one unit of work.
///
/// Extraction completes for all indicators before the first write, and any
/// failure while writing rolls the whole run back.
pub fn ingest_workbook(
    store: &mut Store,
    workbook: &Workbook,
    layouts: &[(Indicator, IndicatorLayout)],
) -> Result<IngestSummary> {
    let extracted: Vec<(Indicator, IndicatorSeries)> = layouts
        .iter()
        .map(|(indicator, layout)| Ok((*indicator, extract_indicator(workbook, *indicator, layout)?)))
        .collect::<Result<_>>()?;

    let mut uow = store.begin()?;
    let mut tables = Vec::with_capacity(extracted.len() * Variant::ALL.len());
    for (indicator, series) in &extracted {
        for variant in Variant::ALL {
            let table = indicator.table(variant);
            let rows = uow.upsert(&table, series.get(variant))?;
            info!(%indicator, %variant, table = table.name, rows, "upserted variant");
            tables.push(TableSummary {
                table: table.name,
                rows,
            });
        }
    }
    let rows_written = uow.commit()?;

    for summary in &tables {
        counter!("rows_upserted_total", "table" => summary.table).increment(summary.rows as u64);
    }
    Ok(IngestSummary {
        rows_written,
        tables,
    })
}

async fn record_run(db_path: &Path, run: &IngestRun) -> Result<()> {
    let db_path = db_path.to_path_buf();
    let run = run.clone();
    tokio::task::spawn_blocking(move || Store::open(&db_path)?.record_run(&run)).await?
}

async fn fetch_and_ingest(
    source: &dyn WorkbookSource,
    db_path: &Path,
    layouts: &[(Indicator, IndicatorLayout)],
    run: &mut IngestRun,
) -> Result<IngestReport> {
    let bytes = source.fetch().await?;
    let sha = hex::encode(Sha256::digest(&bytes));
    run.workbook_sha256 = Some(sha.clone());

    let db_path = db_path.to_path_buf();
    let layouts = layouts.to_vec();
    let summary = tokio::task::spawn_blocking(move || {
        let workbook = Workbook::from_xlsx(bytes, &required_sheets(&layouts))?;
        let mut store = Store::open(&db_path)?;
        ingest_workbook(&mut store, &workbook, &layouts)
    })
    .await??;

    Ok(IngestReport {
        run_id: run.run_id.clone(),
        workbook_sha256: sha,
        rows_written: summary.rows_written,
        tables: summary.tables,
    })
}

/// One full ingestion run: fetch the workbook once, extract, upsert, record history.
#[instrument(skip(source, layouts))]
pub async fn run_ingestion(
    source: &dyn WorkbookSource,
    db_path: PathBuf,
    layouts: &[(Indicator, IndicatorLayout)],
) -> Result<IngestReport> {
    let started = Instant::now();
    let mut run = IngestRun {
        run_id: Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        finished_at: None,
        status: RunStatus::Running,
        workbook_sha256: None,
        rows_written: 0,
        error: None,
    };
    info!(run_id = %run.run_id, "starting ingestion run");
    record_run(&db_path, &run).await?;

    let outcome = fetch_and_ingest(source, &db_path, layouts, &mut run).await;

    run.finished_at = Some(Utc::now());
    match &outcome {
        Ok(report) => {
            run.status = RunStatus::Succeeded;
            run.rows_written = report.rows_written;
            info!(run_id = %run.run_id, rows = report.rows_written, "ingestion run succeeded");
        }
        Err(e) => {
            run.status = RunStatus::Failed;
            run.error = Some(e.to_string());
            error!(run_id = %run.run_id, error = %e, "ingestion run failed");
        }
    }
    if let Err(e) = record_run(&db_path, &run).await {
        warn!(run_id = %run.run_id, error = %e, "failed to record run history");
    }

    counter!("ingest_runs_total", "status" => run.status.as_str()).increment(1);
    histogram!("ingest_duration_seconds").record(started.elapsed().as_secs_f64());
    outcome
}
