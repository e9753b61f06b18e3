// Query pipeline
// rewrite -> embed -> nearest-neighbor search -> score threshold -> results


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{MAX_TOP_K, validate_min_score, validate_top_k};
use crate::database::{IndexHit, VectorIndex};
use crate::embeddings::{EmbeddingProvider, encode_normalized};
use crate::records::QuestionType;
use crate::rewrite::QueryRewriter;
use crate::{QaError, Result};

/// One matching entry with its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub question: String,
    /// Cosine similarity clamped into `[0, 1]`
    pub score: f32,
    pub chunk_id: String,
    pub header: String,
    pub raw_content: String,
    pub standard_answer: String,
    pub image_url: Option<String>,
    pub file_source: String,
    pub row_index: u64,
    pub question_type: QuestionType,
}

impl QueryResult {
    fn from_hit(hit: IndexHit) -> Self {
        let metadata = hit.metadata;
        Self {
            question: hit.question,
            score: score_from_distance(hit.distance),
            chunk_id: metadata.chunk_id,
            header: metadata.header,
            raw_content: metadata.raw_content,
            standard_answer: metadata.standard_answer,
            image_url: metadata.image_url,
            file_source: metadata.file_source,
            row_index: metadata.row_index,
            question_type: metadata.question_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub question: String,
    pub top_k: usize,
    pub min_score: f32,
    pub use_rewrite: bool,
}

/// Results plus the question text that was actually searched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub original_question: String,
    pub effective_question: String,
    pub results: Vec<QueryResult>,
}

impl QueryOutcome {
    #[inline]
    pub fn was_rewritten(&self) -> bool {
        self.original_question != self.effective_question
    }
}

/// Similarity for a cosine distance, clamped into `[0, 1]`
#[inline]
pub fn score_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}

pub struct QueryEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    rewriter: Option<QueryRewriter>,
}

impl QueryEngine {
    #[inline]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            rewriter: None,
        }
    }

    #[inline]
    pub fn with_rewriter(mut self, rewriter: Option<QueryRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    #[inline]
    pub fn rewrite_available(&self) -> bool {
        self.rewriter.is_some()
    }

    /// Number of entries in the searched index
    #[inline]
    pub async fn entry_count(&self) -> Result<u64> {
        self.index.count().await
    }

    /// Ranked results for `question`, best first
    #[inline]
    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        min_score: f32,
        use_rewrite: bool,
    ) -> Result<Vec<QueryResult>> {
        let request = QueryRequest {
            question: question.to_string(),
            top_k,
            min_score,
            use_rewrite,
        };
        Ok(self.search(&request).await?.results)
    }

    /// Run the full pipeline.
    ///
    /// Invalid parameters fail before any collaborator is called. Rewrite
    /// failures never surface; the original question is searched instead.
    #[inline]
    pub async fn search(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        validate_request(request)?;

        let original_question = request.question.trim().to_string();
        let effective_question = match (&self.rewriter, request.use_rewrite) {
            (Some(rewriter), true) => rewriter.optimize(&original_question),
            _ => original_question.clone(),
        };
        if effective_question != original_question {
            info!("Searching with rewritten question: {}", effective_question);
        }

        let mut vectors = encode_normalized(
            self.embedder.as_ref(),
            std::slice::from_ref(&effective_question),
        )?;
        let vector = vectors
            .pop()
            .ok_or_else(|| QaError::Embedding("No embedding returned for query".to_string()))?;

        let hits = self.index.query(&vector, request.top_k).await?;
        debug!("Index returned {} candidates", hits.len());

        let mut results: Vec<QueryResult> = hits
            .into_iter()
            .map(QueryResult::from_hit)
            .filter(|r| r.score >= request.min_score)
            .collect();
        // Stable, so ties keep the index's nearest-first order
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(
            "{} results at or above min_score {}",
            results.len(),
            request.min_score
        );

        Ok(QueryOutcome {
            original_question,
            effective_question,
            results,
        })
    }
}

fn validate_request(request: &QueryRequest) -> Result<()> {
    if request.question.trim().is_empty() {
        return Err(QaError::InvalidQuery("question is empty".to_string()));
    }
    validate_top_k(request.top_k).map_err(|_| {
        QaError::InvalidQuery(format!(
            "top_k must be between 1 and {MAX_TOP_K}, got {}",
            request.top_k
        ))
    })?;
    validate_min_score(request.min_score).map_err(|_| {
        QaError::InvalidQuery(format!(
            "min_score must be between 0.0 and 1.0, got {}",
            request.min_score
        ))
    })?;
    Ok(())
}
