use std::collections::HashMap;
use std::sync::Mutex;

use super::EmbeddingProvider;
use crate::{QaError, Result};

/// Deterministic provider for tests. Unknown texts get a vector derived from
/// their bytes; every call is recorded.
pub(crate) struct FakeEmbedder {
    dimension: usize,
    known: HashMap<String, Vec<f32>>,
    calls: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

impl FakeEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            known: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing(dimension: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(dimension)
        }
    }

    pub(crate) fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.known.insert(text.to_string(), vector);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn derive(&self, text: &str) -> Vec<f32> {
        let seed: u32 = text.bytes().map(u32::from).sum();
        (0..self.dimension)
            .map(|i| ((seed + i as u32 * 31) % 17 + 1) as f32 * 3.0)
            .collect()
    }
}

impl EmbeddingProvider for FakeEmbedder {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().expect("calls lock").push(texts.to_vec());
        if self.fail {
            return Err(QaError::Embedding("embedding service unavailable".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| self.known.get(t).cloned().unwrap_or_else(|| self.derive(t)))
            .collect())
    }
}
