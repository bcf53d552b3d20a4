//! Bulk document import from CSV and spreadsheet files.
//!
//! Both formats are reduced to [`ImportRow`]s and share one row policy:
//! rows with a blank title or content are skipped, and a blank category falls
//! back to the configured default. Valid rows are indexed as one batch; if
//! that fails, each row is retried on its own so that a single bad row does
//! not block the rest.

use std::io::Cursor;
use std::sync::Arc;

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use kb_core::config::ImportConfig;
use kb_core::error::{KbError, Result};
use kb_core::types::Document;

use crate::knowledge::KnowledgeBaseService;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Supported upload formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Csv,
    /// `.xlsx` or `.xls`, read with calamine.
    Spreadsheet,
}

impl ImportFormat {
    /// Detect the format from the text after the last `.` (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or(filename)
            .to_lowercase();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            other => Err(KbError::Validation(format!(
                "Unsupported file format: {}. Please use .csv or .xlsx",
                other
            ))),
        }
    }
}

/// A row that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based line or sheet row number, header included.
    pub row: usize,
    pub message: String,
}

/// Outcome of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub message: String,
}

impl ImportReport {
    fn new(imported: usize, skipped: usize, errors: Vec<RowError>) -> Self {
        Self {
            imported,
            skipped,
            errors,
            message: format!("Successfully imported {} documents", imported),
        }
    }
}

/// One data row as read from a file, before the row policy is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportRow {
    pub row: usize,
    pub title: String,
    pub content: String,
    pub category: String,
}

/// Column positions resolved from a header row.
#[derive(Debug, Default)]
struct Columns {
    title: Option<usize>,
    content: Option<usize>,
    category: Option<usize>,
}

impl Columns {
    fn locate<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut columns = Self::default();
        for (idx, header) in headers.into_iter().enumerate() {
            let slot = match header.as_ref().trim().to_lowercase().as_str() {
                "title" => &mut columns.title,
                "content" => &mut columns.content,
                "category" => &mut columns.category,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        columns
    }

    fn row<F>(&self, row: usize, cell: F) -> ImportRow
    where
        F: Fn(usize) -> String,
    {
        let pick = |col: Option<usize>| col.map(&cell).unwrap_or_default();
        ImportRow {
            row,
            title: pick(self.title),
            content: pick(self.content),
            category: pick(self.category),
        }
    }
}

fn csv_error(err: csv::Error) -> KbError {
    KbError::Import(format!("Invalid CSV: {}", err))
}

fn spreadsheet_error(err: calamine::Error) -> KbError {
    KbError::Import(format!("Invalid spreadsheet: {}", err))
}

/// Parse CSV with a header row. Missing columns yield blank fields.
///
/// Fields are decoded as UTF-8 with invalid bytes replaced by U+FFFD, so a
/// badly encoded row still imports.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<ImportRow>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let columns = Columns::locate(reader.byte_headers().map_err(csv_error)?.iter().map(lossy));

    let mut rows = Vec::new();
    for (idx, record) in reader.byte_records().enumerate() {
        let record = record.map_err(csv_error)?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        rows.push(columns.row(line, |col| record.get(col).map(lossy).unwrap_or_default()));
    }
    Ok(rows)
}

fn lossy(field: &[u8]) -> String {
    String::from_utf8_lossy(field).trim().to_string()
}

/// Parse the first worksheet of an `.xlsx` or `.xls` workbook.
pub fn parse_spreadsheet(bytes: Vec<u8>) -> Result<Vec<ImportRow>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(spreadsheet_error)?;
    match workbook.worksheet_range_at(0) {
        Some(range) => rows_from_range(&range.map_err(spreadsheet_error)?),
        None => Ok(Vec::new()),
    }
}

/// Read rows from a worksheet range whose first row is the header.
///
/// An empty range yields no rows; a header without `title` and `content`
/// columns is a validation error.
pub fn rows_from_range(range: &Range<Data>) -> Result<Vec<ImportRow>> {
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };

    let columns = Columns::locate(header.iter().map(cell_text));
    if columns.title.is_none() || columns.content.is_none() {
        return Err(KbError::Validation(
            "Spreadsheet must contain 'title' and 'content' columns".to_string(),
        ));
    }

    Ok(rows
        .enumerate()
        // +1 for the header, +1 for 1-based numbering.
        .map(|(idx, cells)| {
            columns.row(first_row + idx + 2, |col| {
                cells.get(col).map(cell_text).unwrap_or_default()
            })
        })
        .collect())
}

/// Render a cell as trimmed text. Empty and error cells become "".
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
    }
}

/// Imports uploaded files into the knowledge base.
pub struct ImportService {
    kb: Arc<KnowledgeBaseService>,
    default_category: String,
}

impl ImportService {
    pub fn new(kb: Arc<KnowledgeBaseService>, config: &ImportConfig) -> Self {
        Self {
            kb,
            default_category: config.default_category.clone(),
        }
    }

    /// Import `bytes` uploaded as `filename`, attributing documents to `username`.
    pub async fn import_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        username: &str,
    ) -> Result<ImportReport> {
        let format = ImportFormat::from_filename(filename)?;
        info!(filename, username, size = bytes.len(), "Importing file");

        let rows = match format {
            ImportFormat::Csv => parse_csv(&bytes)?,
            ImportFormat::Spreadsheet => tokio::task::spawn_blocking(move || parse_spreadsheet(bytes))
                .await
                .map_err(|e| KbError::Import(format!("Spreadsheet parser failed: {}", e)))??,
        };

        let report = self.import_rows(rows, username).await;
        info!(
            filename,
            imported = report.imported,
            skipped = report.skipped,
            failed = report.errors.len(),
            "Import finished"
        );
        Ok(report)
    }

    /// Apply the row policy and index the surviving rows.
    pub async fn import_rows(&self, rows: Vec<ImportRow>, username: &str) -> ImportReport {
        let total = rows.len();
        let candidates: Vec<(usize, Document)> = rows
            .into_iter()
            .filter(|r| !r.title.trim().is_empty() && !r.content.trim().is_empty())
            .map(|r| {
                let category = if r.category.trim().is_empty() {
                    self.default_category.as_str()
                } else {
                    r.category.as_str()
                };
                let doc = Document::create(
                    r.title.trim(),
                    r.content.trim(),
                    Some(category),
                    Some(username.to_string()),
                );
                (r.row, doc)
            })
            .collect();
        let skipped = total - candidates.len();

        if candidates.is_empty() {
            return ImportReport::new(0, skipped, Vec::new());
        }

        let docs: Vec<Document> = candidates.iter().map(|(_, d)| d.clone()).collect();
        match self.kb.add_documents(&docs).await {
            Ok(_) => ImportReport::new(docs.len(), skipped, Vec::new()),
            Err(e) => {
                warn!(
                    count = docs.len(),
                    error = %e,
                    "Batch import failed, retrying rows individually"
                );
                self.import_individually(candidates, skipped).await
            }
        }
    }

    async fn import_individually(
        &self,
        candidates: Vec<(usize, Document)>,
        skipped: usize,
    ) -> ImportReport {
        let mut imported = 0;
        let mut errors = Vec::new();
        for (row, doc) in candidates {
            match self.kb.add_documents(std::slice::from_ref(&doc)).await {
                Ok(_) => imported += 1,
                Err(e) => {
                    warn!(row, error = %e, "Row import failed");
                    errors.push(RowError {
                        row,
                        message: e.to_string(),
                    });
                }
            }
        }
        ImportReport::new(imported, skipped, errors)
    }
}
