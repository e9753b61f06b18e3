use calamine::{Data, Reader, open_workbook_auto};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{QaRecord, RawRow};

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

// Accepted header names per field, first match wins
const CHUNK_ID_COLUMNS: &[&str] = &["chunk_id"];
const HEADER_COLUMNS: &[&str] = &["header"];
const CONTENT_COLUMNS: &[&str] = &["content", "raw_content"];
const STANDARD_QUESTION_COLUMNS: &[&str] = &["标准问题", "standard_question"];
const EXTENDED_QUESTION_COLUMNS: &[&str] = &["发散问题", "extended_question"];
const STANDARD_ANSWER_COLUMNS: &[&str] = &["客服答案", "standard_answer"];
const IMAGE_COLUMNS: &[&str] = &["图片", "image_url"];

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to open workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("Workbook has no worksheets")]
    NoWorksheet,
    #[error("Sheet has no header row")]
    EmptySheet,
    #[error("Missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("Row {row_index}: missing {field}")]
    MissingValue {
        row_index: u64,
        field: &'static str,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Records read from one sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetLoad {
    pub records: Vec<QaRecord>,
    pub skipped_rows: usize,
}

/// Records read from every spreadsheet in a folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderLoad {
    pub records: Vec<QaRecord>,
    pub files_read: Vec<String>,
    pub failed_files: Vec<(String, String)>,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    chunk_id: Option<usize>,
    header: Option<usize>,
    raw_content: Option<usize>,
    standard_question: usize,
    extended_question: Option<usize>,
    standard_answer: usize,
    image_url: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[String]) -> Result<Self, RecordError> {
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| header.iter().position(|h| h.trim() == *name))
        };

        Ok(Self {
            chunk_id: find(CHUNK_ID_COLUMNS),
            header: find(HEADER_COLUMNS),
            raw_content: find(CONTENT_COLUMNS),
            standard_question: find(STANDARD_QUESTION_COLUMNS)
                .ok_or(RecordError::MissingColumn("standard_question"))?,
            extended_question: find(EXTENDED_QUESTION_COLUMNS),
            standard_answer: find(STANDARD_ANSWER_COLUMNS)
                .ok_or(RecordError::MissingColumn("standard_answer"))?,
            image_url: find(IMAGE_COLUMNS),
        })
    }

    fn raw_row(&self, row: &[String]) -> RawRow {
        let cell = |index: Option<usize>| {
            index
                .and_then(|i| row.get(i))
                .cloned()
                .unwrap_or_default()
        };

        RawRow {
            chunk_id: cell(self.chunk_id),
            header: cell(self.header),
            raw_content: cell(self.raw_content),
            standard_question: cell(Some(self.standard_question)),
            extended_question: cell(self.extended_question),
            standard_answer: cell(Some(self.standard_answer)),
            image_url: cell(self.image_url),
        }
    }
}

/// Turn header-first string rows into validated records.
///
/// Rows that fail validation are skipped with a warning; fully blank rows
/// are ignored.
#[inline]
pub fn records_from_rows<I>(file_source: &str, rows: I) -> Result<SheetLoad, RecordError>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(RecordError::EmptySheet)?;
    let columns = ColumnMap::from_header(&header)?;

    let mut load = SheetLoad::default();

    for (index, row) in rows.enumerate() {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        match QaRecord::from_raw(columns.raw_row(&row), file_source, index as u64) {
            Ok(record) => load.records.push(record),
            Err(e) => {
                warn!("Skipping row in {}: {}", file_source, e);
                load.skipped_rows += 1;
            }
        }
    }

    Ok(load)
}

/// Read the first worksheet of a spreadsheet file
#[inline]
pub fn read_workbook(path: &Path) -> Result<SheetLoad, RecordError> {
    let file_source = file_name(path);
    debug!("Reading workbook {}", path.display());

    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(RecordError::NoWorksheet)??;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());

    records_from_rows(&file_source, rows)
}

/// Read every spreadsheet directly inside `dir`.
///
/// A file that fails to read is logged and skipped; the rest still load.
#[inline]
pub fn read_folder(dir: &Path) -> Result<FolderLoad, RecordError> {
    let files = spreadsheet_files(dir)?;
    info!("Found {} spreadsheet files in {}", files.len(), dir.display());

    let mut load = FolderLoad::default();

    for path in files {
        let name = file_name(&path);
        match read_workbook(&path) {
            Ok(sheet) => {
                info!("Extracted {} QA records from {}", sheet.records.len(), name);
                load.skipped_rows += sheet.skipped_rows;
                load.records.extend(sheet.records);
                load.files_read.push(name);
            }
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                load.failed_files.push((name, e.to_string()));
            }
        }
    }

    info!("Extracted {} QA records in total", load.records.len());
    Ok(load)
}

fn spreadsheet_files(dir: &Path) -> Result<Vec<PathBuf>, RecordError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_spreadsheet(path))
        .collect();
    files.sort();
    Ok(files)
}

fn is_spreadsheet(path: &Path) -> bool {
    // Office lock files share the extension of the workbook they guard
    if file_name(path).starts_with("~$") {
        return false;
    }

    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}
