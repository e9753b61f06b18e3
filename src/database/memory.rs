use async_trait::async_trait;
use std::sync::Mutex;

use super::{IndexHit, IndexedEntry, VectorIndex};
use crate::Result;
use crate::embeddings::l2_norm;

/// Brute-force cosine index for tests
#[derive(Default)]
pub(crate) struct MemoryIndex {
    entries: Mutex<Vec<IndexedEntry>>,
}

impl MemoryIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entries(&self) -> Vec<IndexedEntry> {
        self.entries.lock().expect("index lock").clone()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norms = l2_norm(a) * l2_norm(b);
    if norms == 0.0 { 1.0 } else { 1.0 - dot / norms }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn add(&self, entries: &[IndexedEntry]) -> Result<()> {
        self.entries
            .lock()
            .expect("index lock")
            .extend_from_slice(entries);
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        let mut hits: Vec<IndexHit> = self
            .entries()
            .into_iter()
            .map(|entry| IndexHit {
                distance: cosine_distance(vector, &entry.vector),
                id: entry.id,
                question: entry.question,
                metadata: entry.metadata,
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.lock().expect("index lock").len() as u64)
    }

    async fn get_all(&self) -> Result<Vec<IndexedEntry>> {
        Ok(self.entries())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().expect("index lock").clear();
        Ok(())
    }
}
