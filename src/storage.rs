use crate::error::Result;
use crate::types::{
    records, AggregateColumn, Indicator, Month, TableSpec, TimeSeriesRecord, Variant, YearSeries,
};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed store of the per-(indicator, variant) tables and the run history.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(&schema_sql())?;
        Ok(Self { conn })
    }

    /// Start the single transaction an ingestion run writes through.
    pub fn begin(&mut self) -> Result<UnitOfWork<'_>> {
        Ok(UnitOfWork {
            tx: self.conn.transaction()?,
            rows_written: 0,
        })
    }

    /// Stored rows of one series from `start_year` onwards, oldest first.
    pub fn select_series(
        &self,
        indicator: Indicator,
        variant: Variant,
        start_year: i32,
    ) -> Result<Vec<SeriesRow>> {
        let table = indicator.table(variant);
        let columns = table
            .columns()
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM {} WHERE year >= ?1 ORDER BY year",
            table.name
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![start_year], |row| SeriesRow::from_row(&table, row))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn row_count(&self, table: &TableSpec) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table.name), [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn record_run(&self, run: &IngestRun) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ingest_runs (run_id, started_at, finished_at, status, workbook_sha256, rows_written, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(run_id) DO UPDATE SET finished_at=excluded.finished_at, status=excluded.status,
                 workbook_sha256=excluded.workbook_sha256, rows_written=excluded.rows_written, error=excluded.error",
            params![
                run.run_id,
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
                run.status.as_str(),
                run.workbook_sha256,
                run.rows_written as i64,
                run.error,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<IngestRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, started_at, finished_at, status, workbook_sha256, rows_written, error
             FROM ingest_runs ORDER BY started_at DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], IngestRun::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

fn schema_sql() -> String {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id           TEXT PRIMARY KEY,
            started_at       TEXT NOT NULL,
            finished_at      TEXT,
            status           TEXT NOT NULL,
            workbook_sha256  TEXT,
            rows_written     INTEGER NOT NULL DEFAULT 0,
            error            TEXT
        );\n",
    );
    for table in Indicator::all_tables() {
        let mut columns = vec!["year INTEGER PRIMARY KEY".to_string()];
        columns.extend(table.columns().iter().skip(1).map(|c| format!("\"{c}\" REAL")));
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});\n",
            table.name,
            columns.join(", ")
        ));
    }
    sql
}

/// `INSERT … ON CONFLICT(year)` overwriting every non-key column.
fn upsert_sql(table: &TableSpec) -> String {
    let columns = table.columns();
    let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = quoted[1..]
        .iter()
        .map(|c| format!("{c}=excluded.{c}"))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(year) DO UPDATE SET {}",
        table.name,
        quoted.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

/// Bind values in `TableSpec::columns` order; the aggregate is dropped for tables without one.
fn bind(table: &TableSpec, record: &TimeSeriesRecord) -> Vec<Value> {
    let mut row = Vec::with_capacity(14);
    row.push(Value::Integer(i64::from(record.year)));
    if table.aggregate.is_some() {
        row.push(real(record.values.aggregate));
    }
    row.extend(record.values.months.iter().copied().map(real));
    row
}

/// Merge-insert every record of a series into `table`; returns the rows written.
///
/// Years absent from `series` are left untouched.
pub fn upsert(conn: &Connection, table: &TableSpec, series: &YearSeries) -> Result<usize> {
    let mut stmt = conn.prepare_cached(&upsert_sql(table))?;
    let mut written = 0;
    for record in records(series) {
        written += stmt.execute(params_from_iter(bind(table, &record)))?;
    }
    debug!(table = table.name, rows = written, "upserted series");
    Ok(written)
}

/// All writes of one ingestion run; dropped without `commit` rolls everything back.
pub struct UnitOfWork<'c> {
    tx: Transaction<'c>,
    rows_written: usize,
}

impl UnitOfWork<'_> {
    pub fn upsert(&mut self, table: &TableSpec, series: &YearSeries) -> Result<usize> {
        let written = upsert(&self.tx, table, series)?;
        self.rows_written += written;
        Ok(written)
    }

    pub fn commit(self) -> Result<usize> {
        let rows = self.rows_written;
        self.tx.commit()?;
        info!(rows, "committed ingestion unit of work");
        Ok(rows)
    }
}

/// One stored year as returned by the read surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub year: i32,
    pub aggregate: Option<(AggregateColumn, Option<f64>)>,
    pub months: [Option<f64>; 12],
}

impl SeriesRow {
    fn from_row(table: &TableSpec, row: &Row<'_>) -> rusqlite::Result<Self> {
        let year: i32 = row.get(0)?;
        let (aggregate, first_month) = match table.aggregate {
            Some(column) => (Some((column, row.get::<_, Option<f64>>(1)?)), 2),
            None => (None, 1),
        };
        let mut months = [None; 12];
        for (i, slot) in months.iter_mut().enumerate() {
            *slot = row.get(first_month + i)?;
        }
        Ok(Self {
            year,
            aggregate,
            months,
        })
    }

    pub fn month(&self, month: Month) -> Option<f64> {
        self.months[month.index()]
    }
}

impl Serialize for SeriesRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(14))?;
        map.serialize_entry("year", &self.year)?;
        if let Some((column, value)) = &self.aggregate {
            map.serialize_entry(column.column_name(), value)?;
        }
        for month in Month::ALL {
            map.serialize_entry(month.key(), &self.months[month.index()])?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(idx: usize, s: &str) -> rusqlite::Result<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("unknown run status '{other}'").into(),
            )),
        }
    }
}

/// History entry for one ingestion attempt.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub workbook_sha256: Option<String>,
    pub rows_written: usize,
    pub error: Option<String>,
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl IngestRun {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let started_at: String = row.get(1)?;
        let finished_at: Option<String> = row.get(2)?;
        let status: String = row.get(3)?;
        Ok(Self {
            run_id: row.get(0)?,
            started_at: parse_timestamp(1, &started_at)?,
            finished_at: finished_at
                .as_deref()
                .map(|t| parse_timestamp(2, t))
                .transpose()?,
            status: RunStatus::parse(3, &status)?,
            workbook_sha256: row.get(4)?,
            rows_written: row.get::<_, i64>(5)? as usize,
            error: row.get(6)?,
        })
    }
}
