// Ingestion pipeline
// Turns QA records into embedded index entries, batch by batch


use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::Result;
use crate::database::{IndexedEntry, VectorIndex};
use crate::embeddings::{EmbeddingProvider, encode_normalized};
use crate::records::{EntryMetadata, QaRecord, QuestionType};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A question waiting to be embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub question: String,
    pub metadata: EntryMetadata,
}

/// Entries derived from a record set, before embedding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPlan {
    pub entries: Vec<PendingEntry>,
    pub standard: usize,
    pub extended: usize,
    pub duplicates_skipped: usize,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub records: usize,
    pub entries_written: usize,
    pub standard_entries: usize,
    pub extended_entries: usize,
    pub duplicates_skipped: usize,
    pub batches: usize,
}

/// Expand records into standard and extended entries.
///
/// A standard question already seen earlier in `records` is skipped; the
/// first occurrence wins. Extended questions are always kept.
#[inline]
pub fn build_entries(records: &[QaRecord]) -> EntryPlan {
    let mut plan = EntryPlan::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for record in records {
        if seen.insert(record.standard_question.as_str()) {
            plan.entries.push(PendingEntry {
                question: record.standard_question.clone(),
                metadata: record.metadata(QuestionType::Standard),
            });
            plan.standard += 1;
        } else {
            debug!(
                "Duplicate standard question skipped: {}",
                record.standard_question
            );
            plan.duplicates_skipped += 1;
        }

        if let Some(extended) = &record.extended_question {
            plan.entries.push(PendingEntry {
                question: extended.clone(),
                metadata: record.metadata(QuestionType::Extended),
            });
            plan.extended += 1;
        }
    }

    plan
}

/// Writes records into a vector index through an embedding provider
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    show_progress: bool,
}

impl Ingestor {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[inline]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Embed and store every entry derived from `records`.
    ///
    /// Each batch is one embedding call followed by one index write. Any
    /// embedding or index failure aborts the run; batches already written
    /// stay in the index.
    #[inline]
    pub async fn ingest(&self, records: &[QaRecord]) -> Result<IngestReport> {
        let plan = build_entries(records);
        let mut report = IngestReport {
            records: records.len(),
            standard_entries: plan.standard,
            extended_entries: plan.extended,
            duplicates_skipped: plan.duplicates_skipped,
            ..IngestReport::default()
        };

        if plan.entries.is_empty() {
            info!("No entries to ingest");
            return Ok(report);
        }

        let run_id = Uuid::new_v4();
        let total_batches = plan.entries.len().div_ceil(self.batch_size);
        info!(
            "Ingesting {} entries from {} records in {} batches",
            plan.entries.len(),
            records.len(),
            total_batches
        );

        let bar = self.progress_bar(total_batches as u64);
        let mut sequence = 0usize;

        for batch in plan.entries.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|e| e.question.clone()).collect();
            let vectors = encode_normalized(self.embedder.as_ref(), &texts)?;

            let entries: Vec<IndexedEntry> = batch
                .iter()
                .zip(vectors)
                .map(|(pending, vector)| {
                    let id = format!("{run_id}-{sequence:08}");
                    sequence += 1;
                    IndexedEntry {
                        id,
                        question: pending.question.clone(),
                        vector,
                        metadata: pending.metadata.clone(),
                    }
                })
                .collect();

            self.index.add(&entries).await?;

            report.entries_written += entries.len();
            report.batches += 1;
            bar.inc(1);
            debug!(
                "Batch {}/{} stored ({} entries)",
                report.batches,
                total_batches,
                entries.len()
            );
        }

        bar.finish_and_clear();
        info!(
            "Ingestion finished: {} entries written ({} standard, {} extended, {} duplicates skipped)",
            report.entries_written,
            report.standard_entries,
            report.extended_entries,
            report.duplicates_skipped
        );
        Ok(report)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}") {
            bar.set_style(style);
        }
        bar.set_message("batches");
        bar
    }
}
