// QA records module
// Structured question/answer rows and the spreadsheet reader that produces them

pub mod reader;


use serde::{Deserialize, Serialize};
use std::fmt;

pub use reader::{FolderLoad, RecordError, SheetLoad, read_folder, read_workbook, records_from_rows};

/// Cell text spreadsheet exports use for a missing value
pub const EMPTY_PLACEHOLDER: &str = "nan";

/// One validated row of source data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub chunk_id: String,
    pub header: String,
    pub raw_content: String,
    pub standard_question: String,
    pub extended_question: Option<String>,
    pub standard_answer: String,
    pub image_url: Option<String>,
    pub file_source: String,
    pub row_index: u64,
}

/// Which phrasing of the question an index entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Standard,
    Extended,
}

impl QuestionType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Extended => "extended",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Self::Standard),
            "extended" => Some(Self::Extended),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an index entry carries besides its question text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub chunk_id: String,
    pub header: String,
    pub raw_content: String,
    pub standard_answer: String,
    pub image_url: Option<String>,
    pub file_source: String,
    pub row_index: u64,
    pub question_type: QuestionType,
}

/// Raw cell values for one row before validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub chunk_id: String,
    pub header: String,
    pub raw_content: String,
    pub standard_question: String,
    pub extended_question: String,
    pub standard_answer: String,
    pub image_url: String,
}

impl QaRecord {
    /// Validate a raw row.
    ///
    /// Fails when the standard question or the answer is missing.
    #[inline]
    pub fn from_raw(raw: RawRow, file_source: &str, row_index: u64) -> Result<Self, RecordError> {
        let standard_question =
            present(&raw.standard_question).ok_or(RecordError::MissingValue {
                row_index,
                field: "standard_question",
            })?;
        let standard_answer = present(&raw.standard_answer).ok_or(RecordError::MissingValue {
            row_index,
            field: "standard_answer",
        })?;

        Ok(Self {
            chunk_id: raw.chunk_id.trim().to_string(),
            header: raw.header.trim().to_string(),
            raw_content: raw.raw_content.trim().to_string(),
            standard_question,
            extended_question: present(&raw.extended_question),
            standard_answer,
            image_url: present(&raw.image_url),
            file_source: file_source.to_string(),
            row_index,
        })
    }

    /// Metadata for an entry built from this record
    #[inline]
    pub fn metadata(&self, question_type: QuestionType) -> EntryMetadata {
        EntryMetadata {
            chunk_id: self.chunk_id.clone(),
            header: self.header.clone(),
            raw_content: self.raw_content.clone(),
            standard_answer: self.standard_answer.clone(),
            image_url: self.image_url.clone(),
            file_source: self.file_source.clone(),
            row_index: self.row_index,
            question_type,
        }
    }
}

/// Trimmed value, or `None` for blanks and the empty placeholder
#[inline]
pub fn present(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(EMPTY_PLACEHOLDER) {
        None
    } else {
        Some(trimmed.to_string())
    }
}
