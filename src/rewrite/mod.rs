// Query rewriting
// Rephrases a user question through a remote chat model before it is embedded

pub mod chat;

#[cfg(test)]
mod tests;

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ChatCredentials, RewriteConfig};

pub use chat::ChatClient;

/// Rewrites shorter than this are discarded
pub const MIN_REWRITE_CHARS: usize = 3;

const PROMPT_TEMPLATE: &str = "\
You help users search a customer-service question and answer knowledge base.
Rewrite the user's question so it is more complete, specific and easier to
match against the stored questions.

Rules:
1. Keep the original intent. Do not add facts that are not in the question.
2. Use the precise terms a support document would use.
3. Replace vague wording with explicit wording.
4. If the question is incomplete, complete it the way a typical support question would read.
5. Output only the rewritten question, with no explanation.

User question:
\"{question}\"

Rewritten question:";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("Chat request failed: {0}")]
    Transport(String),
    #[error("Chat service returned error {code}: {message}")]
    Service { code: i64, message: String },
    #[error("Malformed chat frame: {0}")]
    Protocol(String),
    #[error("Chat stream ended before the final frame")]
    Incomplete,
}

/// A remote chat model reachable with one blocking call
pub trait ChatService: Send + Sync {
    /// Send `prompt` as a single user message and return the assembled reply
    fn complete(&self, prompt: &str) -> Result<String, RewriteError>;
}

/// Instruction prompt asking the model to rephrase `question`
#[inline]
pub fn build_prompt(question: &str) -> String {
    PROMPT_TEMPLATE.replace("{question}", question)
}

/// Clean a model reply.
///
/// Returns `None` when the reply is too short or says nothing new, in which
/// case the caller keeps the original question.
#[inline]
pub fn parse_response(response: &str, original: &str) -> Option<String> {
    let trimmed = response.trim();
    let unquoted = strip_quotes(trimmed);

    if unquoted.chars().count() < MIN_REWRITE_CHARS || unquoted == original {
        return None;
    }
    Some(unquoted.to_string())
}

fn strip_quotes(text: &str) -> &str {
    const PAIRS: [(char, char); 3] = [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}')];

    for (open, close) in PAIRS {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner;
        }
    }
    text
}

/// Rewrites questions, degrading to the original on any failure
pub struct QueryRewriter {
    service: Box<dyn ChatService>,
    max_retries: u32,
    retry_delay: Duration,
}

impl QueryRewriter {
    #[inline]
    pub fn new(service: Box<dyn ChatService>) -> Self {
        let defaults = RewriteConfig::default();
        Self {
            service,
            max_retries: defaults.max_retries,
            retry_delay: Duration::from_millis(defaults.retry_delay_ms),
        }
    }

    /// Build a rewriter backed by the websocket chat client.
    ///
    /// Returns `None` when rewriting is disabled, has no endpoint, or has no
    /// credentials.
    #[inline]
    pub fn from_config(
        config: &RewriteConfig,
        credentials: Option<ChatCredentials>,
    ) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            debug!("Query rewriting disabled in config");
            return Ok(None);
        }
        let Some(endpoint) = config.endpoint_url()? else {
            debug!("No rewrite endpoint configured");
            return Ok(None);
        };
        let Some(credentials) = credentials else {
            warn!("Rewrite endpoint configured but chat credentials are not set; rewriting disabled");
            return Ok(None);
        };

        let client = ChatClient::new(endpoint, credentials, config);
        Ok(Some(
            Self::new(Box::new(client))
                .with_max_retries(config.max_retries)
                .with_retry_delay(Duration::from_millis(config.retry_delay_ms)),
        ))
    }

    #[inline]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Rewrite `question`; never fails.
    ///
    /// Service errors are retried with a fixed delay. A reply that parses
    /// to nothing new ends the attempt loop immediately.
    #[inline]
    pub fn optimize(&self, question: &str) -> String {
        let prompt = build_prompt(question);

        for attempt in 1..=self.max_retries {
            debug!("Rewrite attempt {}/{}", attempt, self.max_retries);

            match self.service.complete(&prompt) {
                Ok(response) => {
                    return match parse_response(&response, question) {
                        Some(rewritten) => {
                            info!("Rewrote query '{}' -> '{}'", question, rewritten);
                            rewritten
                        }
                        None => {
                            debug!("Rewrite added nothing, keeping original question");
                            question.to_string()
                        }
                    };
                }
                Err(e) => {
                    warn!(
                        "Rewrite attempt {}/{} failed: {}",
                        attempt, self.max_retries, e
                    );
                    if attempt < self.max_retries {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        error!(
            "All {} rewrite attempts failed, using original question",
            self.max_retries
        );
        question.to_string()
    }
}

impl std::fmt::Debug for QueryRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRewriter")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}
