use super::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned replies and records every prompt it receives
#[derive(Clone)]
struct ScriptedChat {
    replies: Arc<Mutex<VecDeque<Result<String, RewriteError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChat {
    fn new(replies: Vec<Result<String, RewriteError>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            prompts: Arc::default(),
        }
    }

    fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }
}

impl ChatService for ScriptedChat {
    fn complete(&self, prompt: &str) -> Result<String, RewriteError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(RewriteError::Incomplete))
    }
}

fn rewriter(chat: &ScriptedChat) -> QueryRewriter {
    QueryRewriter::new(Box::new(chat.clone())).with_retry_delay(Duration::ZERO)
}

fn transport_error() -> Result<String, RewriteError> {
    Err(RewriteError::Transport("connection refused".to_string()))
}

#[test]
fn prompt_embeds_the_question() {
    let prompt = build_prompt("warranty");
    assert!(prompt.contains("\"warranty\""));
    assert!(prompt.contains("Output only the rewritten question"));
    assert!(!prompt.contains("{question}"));
}

#[test]
fn parse_trims_and_strips_one_quote_layer() {
    assert_eq!(
        parse_response("  \"How long is the warranty?\"  ", "warranty"),
        Some("How long is the warranty?".to_string())
    );
    assert_eq!(
        parse_response("'What does it cost?'", "price"),
        Some("What does it cost?".to_string())
    );
    assert_eq!(
        parse_response("\u{201c}Where is the store?\u{201d}", "store"),
        Some("Where is the store?".to_string())
    );
    assert_eq!(
        parse_response("\"\"nested\"\"", "x"),
        Some("\"nested\"".to_string())
    );
}

#[test]
fn parse_rejects_short_or_unchanged_replies() {
    assert_eq!(parse_response("", "warranty"), None);
    assert_eq!(parse_response("  ok ", "warranty"), None);
    assert_eq!(parse_response("\"ab\"", "warranty"), None);
    assert_eq!(parse_response("warranty", "warranty"), None);
    assert_eq!(parse_response("\"warranty\"", "warranty"), None);
}

#[test]
fn parse_leaves_mismatched_quotes() {
    assert_eq!(
        parse_response("\"How long is it?'", "warranty"),
        Some("\"How long is it?'".to_string())
    );
}

#[test]
fn parse_keeps_whitespace_inside_quotes() {
    assert_eq!(
        parse_response(" \" How long is it? \" ", "warranty"),
        Some(" How long is it? ".to_string())
    );
}

#[test]
fn successful_rewrite_is_returned() {
    let chat = ScriptedChat::new(vec![Ok("\"What is the warranty period?\"".to_string())]);

    let result = rewriter(&chat).optimize("warranty");

    assert_eq!(result, "What is the warranty period?");
    assert_eq!(chat.calls(), 1);
}

#[test]
fn unchanged_rewrite_returns_original_without_retrying() {
    let chat = ScriptedChat::new(vec![Ok("What is the warranty period?".to_string())]);

    let result = rewriter(&chat).optimize("What is the warranty period?");

    assert_eq!(result, "What is the warranty period?");
    assert_eq!(chat.calls(), 1);
}

#[test]
fn transient_errors_are_retried() {
    let chat = ScriptedChat::new(vec![
        transport_error(),
        Err(RewriteError::Service {
            code: 11200,
            message: "rate limited".to_string(),
        }),
        Ok("How long does the warranty last?".to_string()),
    ]);

    let result = rewriter(&chat).optimize("warranty");

    assert_eq!(result, "How long does the warranty last?");
    assert_eq!(chat.calls(), 3);
}

#[test]
fn exhausted_retries_degrade_to_original() {
    let chat = ScriptedChat::new(vec![transport_error(), transport_error(), transport_error()]);

    let result = rewriter(&chat).optimize("warranty");

    assert_eq!(result, "warranty");
    assert_eq!(chat.calls(), 3);
}

#[test]
fn retry_count_is_configurable() {
    let chat = ScriptedChat::new(Vec::new());

    let result = rewriter(&chat).with_max_retries(5).optimize("warranty");

    assert_eq!(result, "warranty");
    assert_eq!(chat.calls(), 5);
}

#[test]
fn rewriter_needs_endpoint_and_credentials() {
    let credentials = ChatCredentials {
        app_id: "app".to_string(),
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
    };

    let no_endpoint = RewriteConfig::default();
    assert!(
        QueryRewriter::from_config(&no_endpoint, Some(credentials.clone()))
            .expect("valid config")
            .is_none()
    );

    let configured = RewriteConfig {
        endpoint: Some("wss://chat.example.com/v1.1/chat".to_string()),
        ..RewriteConfig::default()
    };
    assert!(
        QueryRewriter::from_config(&configured, None)
            .expect("valid config")
            .is_none()
    );
    assert!(
        QueryRewriter::from_config(&configured, Some(credentials.clone()))
            .expect("valid config")
            .is_some()
    );

    let disabled = RewriteConfig {
        enabled: false,
        ..configured
    };
    assert!(
        QueryRewriter::from_config(&disabled, Some(credentials))
            .expect("valid config")
            .is_none()
    );
}
