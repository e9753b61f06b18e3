// Index export
// Dumps every indexed entry to a pretty-printed JSON file


use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::Result;
use crate::database::{IndexedEntry, VectorIndex};
use crate::records::QuestionType;

pub const DEFAULT_EXPORT_FILE: &str = "qa_data_export.json";

/// One exported entry; vectors are left out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: String,
    pub chunk_id: String,
    pub header: String,
    pub raw_content: String,
    pub question: String,
    pub standard_answer: String,
    pub image_url: Option<String>,
    pub file_source: String,
    pub row_index: u64,
    pub question_type: QuestionType,
}

impl From<IndexedEntry> for ExportRecord {
    fn from(entry: IndexedEntry) -> Self {
        let metadata = entry.metadata;
        Self {
            id: entry.id,
            chunk_id: metadata.chunk_id,
            header: metadata.header,
            raw_content: metadata.raw_content,
            question: entry.question,
            standard_answer: metadata.standard_answer,
            image_url: metadata.image_url,
            file_source: metadata.file_source,
            row_index: metadata.row_index,
            question_type: metadata.question_type,
        }
    }
}

/// Write every entry in `index` to `path` as a JSON array.
///
/// Entries are ordered by id. An empty index writes no file and returns 0.
#[inline]
pub async fn export_entries(index: &dyn VectorIndex, path: &Path) -> Result<usize> {
    let mut records: Vec<ExportRecord> = index
        .get_all()
        .await?
        .into_iter()
        .map(ExportRecord::from)
        .collect();

    if records.is_empty() {
        info!("Index is empty, nothing to export");
        return Ok(0);
    }

    records.sort_by(|a, b| a.id.cmp(&b.id));

    let json = serde_json::to_string_pretty(&records).context("Failed to serialize export")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;

    info!("Exported {} entries to {}", records.len(), path.display());
    Ok(records.len())
}
