use crate::error::{IngestError, Result};
use async_trait::async_trait;
use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info};

/// A single worksheet cell, detached from the decoder's representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(s: &str) -> Self {
        Cell::Text(s.to_string())
    }

    /// Header cells become column labels; blank headers yield an empty label.
    fn as_label(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Text(b.to_string()),
            // Date-formatted cells are never figures or years; their serial is dropped.
            Data::DateTime(_) => Cell::Empty,
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// Dense, top-to-bottom grid of one worksheet.
#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

/// Rows below a header row, labelled by that header.
#[derive(Debug)]
pub struct Table<'a> {
    pub header: Vec<String>,
    pub rows: &'a [Vec<Cell>],
}

impl Worksheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Label columns with the cells of `header_row` and return the rows beneath it.
    pub fn table(&self, header_row: usize) -> Result<Table<'_>> {
        let header = self.rows.get(header_row).ok_or_else(|| {
            IngestError::SheetShape(format!(
                "sheet '{}' has {} rows, header row {} is missing",
                self.name,
                self.rows.len(),
                header_row
            ))
        })?;
        Ok(Table {
            header: header.iter().map(Cell::as_label).collect(),
            rows: &self.rows[header_row + 1..],
        })
    }

    fn from_range(name: &str, range: &Range<Data>) -> Self {
        // Range positions are absolute; leading blank rows and columns are kept
        // so header and column indices match the sheet as published.
        let (end_row, end_col) = range.end().unwrap_or((0, 0));
        let rows = if range.is_empty() {
            Vec::new()
        } else {
            (0..=end_row)
                .map(|r| {
                    (0..=end_col)
                        .map(|c| range.get_value((r, c)).map(Cell::from).unwrap_or(Cell::Empty))
                        .collect()
                })
                .collect()
        };
        Self::new(name, rows)
    }
}

/// The worksheets an ingestion run reads, by name.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: HashMap<String, Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sheet: Worksheet) {
        self.sheets.insert(sheet.name.clone(), sheet);
    }

    pub fn worksheet(&self, name: &str) -> Result<&Worksheet> {
        self.sheets
            .get(name)
            .ok_or_else(|| IngestError::SheetShape(format!("worksheet '{name}' not found")))
    }

    /// Decode the named worksheets out of an xlsx payload.
    pub fn from_xlsx(bytes: Vec<u8>, sheet_names: &[&str]) -> Result<Self> {
        let mut xlsx: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
            .map_err(|e| IngestError::Workbook(format!("failed to open workbook: {e}")))?;
        let available = xlsx.sheet_names();

        let mut workbook = Workbook::new();
        for &name in sheet_names {
            if !available.iter().any(|s| s == name) {
                return Err(IngestError::SheetShape(format!(
                    "worksheet '{name}' not found"
                )));
            }
            let range = xlsx
                .worksheet_range(name)
                .map_err(|e| IngestError::Workbook(format!("failed to read '{name}': {e}")))?;
            let sheet = Worksheet::from_range(name, &range);
            debug!(sheet = name, rows = sheet.rows.len(), "decoded worksheet");
            workbook.insert(sheet);
        }
        Ok(workbook)
    }
}

/// Where the raw workbook bytes come from.
#[async_trait]
pub trait WorkbookSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;
}

pub struct ReqwestWorkbookSource {
    client: reqwest::Client,
    url: String,
}

impl ReqwestWorkbookSource {
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl WorkbookSource for ReqwestWorkbookSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        info!(url = %self.url, "downloading workbook");
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::SourceUnavailable {
                status: status.as_u16(),
            });
        }
        let bytes = resp.bytes().await?.to_vec();
        info!(bytes = bytes.len(), "workbook downloaded");
        Ok(bytes)
    }
}
