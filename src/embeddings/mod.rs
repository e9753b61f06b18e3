// Embeddings module
// Turns question text into unit-length vectors through an embedding provider

pub mod ollama;
pub mod vector;

#[cfg(test)]
pub(crate) mod fake;

pub use ollama::OllamaClient;
pub use vector::{l2_norm, l2_normalize};

use crate::Result;

/// Maps text to fixed-length vectors.
///
/// Implementations must return exactly one vector per input text, in order.
/// Output is expected to be deterministic for a fixed model.
pub trait EmbeddingProvider: Send + Sync {
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode and L2-normalize in one step
#[inline]
pub fn encode_normalized(provider: &dyn EmbeddingProvider, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = provider.encode(texts)?;
    if vectors.len() != texts.len() {
        return Err(crate::QaError::Embedding(format!(
            "Provider returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        )));
    }
    for vector in &mut vectors {
        l2_normalize(vector);
    }
    Ok(vectors)
}
