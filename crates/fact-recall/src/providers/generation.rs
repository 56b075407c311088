//! OpenAI-compatible chat generation provider.
//!
//! One struct covers every OpenAI-compatible endpoint (OpenAI, Groq,
//! Ollama's `/v1`, llama.cpp, vLLM, ...): endpoints differ only by base
//! URL and API key. Blocking generation posts `POST {url}/v1/chat/completions`
//! and reads `choices[0].message.content`; streaming posts the same body
//! with `"stream": true` and decodes SSE `data:` lines until `[DONE]`.
//!
//! Cancellation: the returned chunk stream owns the HTTP response body.
//! Dropping it closes the connection, so no further chunks are pulled
//! from the endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use fact_recall_core::error::{RecallError, Result};
use fact_recall_core::generation::{
    ChatMessage, ChunkStream, GenerateOptions, GenerativeProvider,
};

use crate::config::GenerationConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

/// Generative provider for any OpenAI-compatible chat completions API.
pub struct OpenAiCompatibleGenerator {
    model: String,
    base_url: String,
    /// Empty means no Authorization header (local endpoints).
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleGenerator {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let base_url = config
            .url
            .clone()
            .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string());
        let api_key = if config.api_key_env.is_empty() {
            String::new()
        } else {
            std::env::var(&config.api_key_env).unwrap_or_default()
        };

        Ok(Self {
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        options: &GenerateOptions,
        stream: bool,
    ) -> serde_json::Value {
        let mut wire: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            wire.push(serde_json::json!({"role": "system", "content": system}));
        }
        for message in messages {
            wire.push(serde_json::json!({
                "role": message.role.as_str(),
                "content": message.content,
            }));
        }

        serde_json::json!({
            "model": self.model,
            "messages": wire,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": stream,
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RecallError::Generation(format!("connection failed ({url}): {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RecallError::Generation(format!(
                "API error {status}: {text}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl GenerativeProvider for OpenAiCompatibleGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<String> {
        let body = self.request_body(messages, system, options, false);
        let response = self.post(&body).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RecallError::Generation(format!("invalid response: {e}")))?;

        json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(String::from)
            .ok_or_else(|| RecallError::Generation("no choices in response".to_string()))
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<ChunkStream> {
        let body = self.request_body(messages, system, options, true);
        let response = self.post(&body).await?;

        let bytes = response.bytes_stream().boxed();
        let stream = futures::stream::try_unfold(
            (bytes, String::new()),
            |(mut bytes, mut buffer)| async move {
                loop {
                    // Drain complete lines already buffered.
                    while let Some(pos) = buffer.find('\n') {
                        let line: String = buffer.drain(..=pos).collect();
                        match parse_sse_line(line.trim()) {
                            SseEvent::Chunk(text) => {
                                return Ok(Some((text, (bytes, buffer))));
                            }
                            SseEvent::Done => return Ok(None),
                            SseEvent::Skip => {}
                            SseEvent::Malformed(e) => {
                                return Err(RecallError::Generation(format!(
                                    "invalid stream payload: {e}"
                                )));
                            }
                        }
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                        Some(Err(e)) => {
                            return Err(RecallError::Generation(format!(
                                "stream read failed: {e}"
                            )))
                        }
                        None => return Ok(None),
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}

enum SseEvent {
    /// A non-empty content delta.
    Chunk(String),
    /// The `[DONE]` terminator.
    Done,
    /// Blank line, comment, or empty delta.
    Skip,
    Malformed(String),
}

/// Decode one SSE line from an OpenAI-compatible stream.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => {
            let delta = value["choices"]
                .get(0)
                .and_then(|c| c["delta"]["content"].as_str())
                .unwrap_or_default();
            if delta.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Chunk(delta.to_string())
            }
        }
        Err(e) => SseEvent::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fact_recall_core::generation::ChatRole;

    fn generator() -> OpenAiCompatibleGenerator {
        OpenAiCompatibleGenerator {
            model: "test-model".to_string(),
            base_url: "http://localhost:9".to_string(),
            api_key: String::new(),
            client: reqwest::Client::new(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let g = generator();
        let messages = vec![
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("my taxes?"),
        ];
        let body = g.request_body(&messages, Some("be helpful"), &GenerateOptions::default(), true);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[0]["content"], "be helpful");
        assert_eq!(wire[3]["role"], "user");
    }

    #[test]
    fn test_request_body_without_system() {
        let g = generator();
        let body = g.request_body(
            &[ChatMessage {
                role: ChatRole::User,
                content: "q".to_string(),
            }],
            None,
            &GenerateOptions::default(),
            false,
        );
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_parse_sse_chunk() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        match parse_sse_line(line) {
            SseEvent::Chunk(text) => assert_eq!(text, "Hel"),
            _ => panic!("expected chunk"),
        }
    }

    #[test]
    fn test_parse_sse_done_and_skips() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
        assert!(matches!(parse_sse_line(""), SseEvent::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Skip));
        // Role-only delta carries no content.
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_line(line), SseEvent::Skip));
    }

    #[test]
    fn test_parse_sse_malformed() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            SseEvent::Malformed(_)
        ));
    }
}
