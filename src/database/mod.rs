// Vector index module
// Entries, search hits and the storage trait the pipelines talk to

pub mod lancedb;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::records::EntryMetadata;

pub use lancedb::VectorStore;

/// One question phrasing with its embedding, as stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub id: String,
    pub question: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// A nearest-neighbor match
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub question: String,
    /// Cosine distance to the query vector
    pub distance: f32,
    pub metadata: EntryMetadata,
}

/// Storage for embedded entries with nearest-neighbor lookup
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append entries; an empty slice is a no-op
    async fn add(&self, entries: &[IndexedEntry]) -> Result<()>;

    /// Up to `limit` hits ordered nearest first. An empty index yields none.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>>;

    async fn count(&self) -> Result<u64>;

    async fn get_all(&self) -> Result<Vec<IndexedEntry>>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;
}
