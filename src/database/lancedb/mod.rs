// LanceDB vector storage
// Arrow schema for index entries and conversions to and from record batches


pub mod vector_store;

pub use vector_store::VectorStore;

use arrow::array::{Array, FixedSizeListArray, Float32Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use super::{IndexHit, IndexedEntry};
use crate::QaError;
use crate::records::{EntryMetadata, QuestionType};

pub const VECTOR_COLUMN: &str = "vector";
const DISTANCE_COLUMN: &str = "_distance";

/// Table schema for entries with `dimension`-length vectors
#[inline]
pub fn entry_schema(dimension: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension as i32,
            ),
            false,
        ),
        Field::new("question", DataType::Utf8, false),
        Field::new("question_type", DataType::Utf8, false),
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("header", DataType::Utf8, false),
        Field::new("raw_content", DataType::Utf8, false),
        Field::new("standard_answer", DataType::Utf8, false),
        Field::new("image_url", DataType::Utf8, true),
        Field::new("file_source", DataType::Utf8, false),
        Field::new("row_index", DataType::UInt64, false),
        Field::new("ingested_at", DataType::Utf8, false),
    ]))
}

/// Vector length declared by a table schema
#[inline]
pub fn schema_dimension(schema: &Schema) -> Option<usize> {
    schema
        .field_with_name(VECTOR_COLUMN)
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => Some(*size as usize),
            _ => None,
        })
}

/// Build a record batch; every vector must have `dimension` values
#[inline]
pub fn entries_to_batch(
    entries: &[IndexedEntry],
    dimension: usize,
    ingested_at: &str,
) -> Result<RecordBatch, QaError> {
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
        return Err(QaError::Database(format!(
            "Entry {} has {} dimensions, index expects {}",
            bad.id,
            bad.vector.len(),
            dimension
        )));
    }

    let mut flat_values = Vec::with_capacity(entries.len() * dimension);
    for entry in entries {
        flat_values.extend_from_slice(&entry.vector);
    }
    let item = Arc::new(Field::new("item", DataType::Float32, true));
    let vectors = FixedSizeListArray::try_new(
        item,
        dimension as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| QaError::Database(format!("Failed to create vector array: {e}")))?;

    let text = |f: fn(&IndexedEntry) -> &str| strings(entries, f);

    let arrays: Vec<Arc<dyn Array>> = vec![
        text(|e| &e.id),
        Arc::new(vectors),
        text(|e| &e.question),
        text(|e| e.metadata.question_type.as_str()),
        text(|e| &e.metadata.chunk_id),
        text(|e| &e.metadata.header),
        text(|e| &e.metadata.raw_content),
        text(|e| &e.metadata.standard_answer),
        Arc::new(StringArray::from(
            entries
                .iter()
                .map(|e| e.metadata.image_url.as_deref())
                .collect::<Vec<_>>(),
        )),
        text(|e| &e.metadata.file_source),
        Arc::new(UInt64Array::from_iter_values(
            entries.iter().map(|e| e.metadata.row_index),
        )),
        Arc::new(StringArray::from_iter_values(
            std::iter::repeat_n(ingested_at, entries.len()),
        )),
    ];

    RecordBatch::try_new(entry_schema(dimension), arrays)
        .map_err(|e| QaError::Database(format!("Failed to create record batch: {e}")))
}

/// Read search results; rows without a distance are treated as exact matches
#[inline]
pub fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<IndexHit>, QaError> {
    let columns = EntryColumns::new(batch)?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    (0..batch.num_rows())
        .map(|row| {
            let distance = distances
                .filter(|d| !d.is_null(row))
                .map_or(0.0, |d| d.value(row));
            Ok(IndexHit {
                id: columns.ids.value(row).to_string(),
                question: columns.questions.value(row).to_string(),
                distance,
                metadata: columns.metadata(row)?,
            })
        })
        .collect()
}

/// Read full entries, vectors included
#[inline]
pub fn entries_from_batch(batch: &RecordBatch) -> Result<Vec<IndexedEntry>, QaError> {
    let columns = EntryColumns::new(batch)?;
    let vectors = column::<FixedSizeListArray>(batch, VECTOR_COLUMN)?;

    (0..batch.num_rows())
        .map(|row| {
            let values = vectors.value(row);
            let floats = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| QaError::Database("Invalid vector value type".to_string()))?;
            Ok(IndexedEntry {
                id: columns.ids.value(row).to_string(),
                question: columns.questions.value(row).to_string(),
                vector: floats.values().to_vec(),
                metadata: columns.metadata(row)?,
            })
        })
        .collect()
}

struct EntryColumns<'a> {
    ids: &'a StringArray,
    questions: &'a StringArray,
    question_types: &'a StringArray,
    chunk_ids: &'a StringArray,
    headers: &'a StringArray,
    raw_contents: &'a StringArray,
    answers: &'a StringArray,
    image_urls: &'a StringArray,
    file_sources: &'a StringArray,
    row_indices: &'a UInt64Array,
}

impl<'a> EntryColumns<'a> {
    fn new(batch: &'a RecordBatch) -> Result<Self, QaError> {
        Ok(Self {
            ids: column(batch, "id")?,
            questions: column(batch, "question")?,
            question_types: column(batch, "question_type")?,
            chunk_ids: column(batch, "chunk_id")?,
            headers: column(batch, "header")?,
            raw_contents: column(batch, "raw_content")?,
            answers: column(batch, "standard_answer")?,
            image_urls: column(batch, "image_url")?,
            file_sources: column(batch, "file_source")?,
            row_indices: column(batch, "row_index")?,
        })
    }

    fn metadata(&self, row: usize) -> Result<EntryMetadata, QaError> {
        let raw_type = self.question_types.value(row);
        let question_type = QuestionType::parse(raw_type)
            .ok_or_else(|| QaError::Database(format!("Unknown question type '{raw_type}'")))?;

        Ok(EntryMetadata {
            chunk_id: self.chunk_ids.value(row).to_string(),
            header: self.headers.value(row).to_string(),
            raw_content: self.raw_contents.value(row).to_string(),
            standard_answer: self.answers.value(row).to_string(),
            image_url: (!self.image_urls.is_null(row))
                .then(|| self.image_urls.value(row).to_string()),
            file_source: self.file_sources.value(row).to_string(),
            row_index: self.row_indices.value(row),
            question_type,
        })
    }
}

fn strings(entries: &[IndexedEntry], f: fn(&IndexedEntry) -> &str) -> Arc<dyn Array> {
    Arc::new(StringArray::from_iter_values(entries.iter().map(f)))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, QaError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QaError::Database(format!("Missing {name} column")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QaError::Database(format!("Invalid {name} column type")))
}
