//! Conversation composition and streamed completion.
//!
//! The completion request always carries exactly two messages: a system
//! prompt holding the retrieved context plus the prior conversation turns,
//! and a user message holding the newest question. The server keeps no
//! conversation state; the full history arrives with every request and is
//! folded into the prompt here.
//!
//! Responses stream token-by-token over SSE; [`CompletionClient::stream`]
//! yields content deltas as they arrive.

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::{Dependency, Error, Result};
use crate::models::ChatMessage;

/// A live token stream from the completion provider.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Process-wide chat completion client, constructed once at startup.
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Build the two-message conversation sent to the completion model.
/// `history` is every prior turn, oldest first; the newest question goes in
/// its own user message.
pub fn build_messages(
    context: &str,
    history: &[ChatMessage],
    question: &str,
) -> Vec<ChatMessage> {
    let history_block = if history.is_empty() {
        "(none)".to_string()
    } else {
        history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let system = format!(
        "You are a helpful AI assistant that answers questions based on the provided context documents.\n\n\
         Context from uploaded documents:\n{context}\n\n\
         Previous conversation:\n{history_block}\n\n\
         Instructions:\n\
         - Answer questions based primarily on the provided context\n\
         - If the answer is not in the context, say so clearly\n\
         - Be concise and helpful\n\
         - Reference specific documents when relevant"
    );

    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system,
        },
        ChatMessage {
            role: "user".to_string(),
            content: question.to_string(),
        },
    ]
}

/// Parse one SSE line from the completion stream. Returns the content delta
/// it carries, if any; `[DONE]`, keep-alives, and deltas without content all
/// yield `None`.
fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.trim().strip_prefix("data: ")?;
    if data == "[DONE]" {
        return None;
    }
    let value: Value = serde_json::from_str(data).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string)
}

impl CompletionClient {
    pub fn new(http: reqwest::Client, config: &CompletionConfig, api_key: String) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            timeout: Duration::from_secs(120),
        }
    }

    /// Open a streaming completion for the given conversation. The returned
    /// stream yields content deltas in arrival order and ends after the
    /// provider's terminal marker.
    pub async fn stream(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&CompletionRequest {
                model: &self.model,
                messages: &messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stream: true,
            })
            .send()
            .await
            .map_err(|e| Error::upstream(Dependency::CompletionProvider, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                Dependency::CompletionProvider,
                format!("HTTP {status}: {body}"),
            ));
        }

        // SSE events can straddle network reads; buffer and emit only
        // complete lines.
        let mut buffer = String::new();
        let stream = resp
            .bytes_stream()
            .map(move |item| {
                let mut out: Vec<Result<String>> = Vec::new();
                match item {
                    Err(e) => out.push(Err(Error::upstream(Dependency::CompletionProvider, e))),
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            if let Some(token) = parse_sse_line(&line) {
                                out.push(Ok(token));
                            }
                        }
                    }
                }
                futures_util::stream::iter(out)
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_sse_line(line), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]"), None);
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        // A role-only delta carries no content.
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
    }

    #[test]
    fn test_build_messages_shape() {
        let history = vec![
            ChatMessage {
                role: "user".to_string(),
                content: "What is in the report?".to_string(),
            },
            ChatMessage {
                role: "assistant".to_string(),
                content: "It covers Q3 revenue.".to_string(),
            },
        ];
        let messages = build_messages("[Document 1 - a.txt]:\nrevenue", &history, "And Q4?");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("[Document 1 - a.txt]"));
        assert!(messages[0]
            .content
            .contains("user: What is in the report?"));
        assert!(messages[0]
            .content
            .contains("assistant: It covers Q3 revenue."));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "And Q4?");
    }

    #[test]
    fn test_build_messages_empty_history() {
        let messages = build_messages("", &[], "First question");
        assert!(messages[0].content.contains("Previous conversation:\n(none)"));
        assert_eq!(messages[1].content, "First question");
    }

    #[test]
    fn test_request_serializes_with_stream_flag() {
        let messages = build_messages("ctx", &[], "q");
        let req = CompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.7,
            max_tokens: 1000,
            stream: true,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["stream"], true);
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
        assert_eq!(value["max_tokens"], 1000);
    }
}
