//! Generative provider trait, chat message types, and streaming hand-off.
//!
//! The engine consumes text generation through [`GenerativeProvider`]:
//! either one blocking call returning the full completion, or a finite
//! stream of text chunks. A stream is not restartable mid-flight;
//! cancellation is dropping the stream — once dropped, no further chunks
//! are requested from the provider and no completion side-effect runs.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

/// A finite stream of completion text chunks.
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Trait for text-generation providers.
///
/// Implementations are created by the application and injected into the
/// [`Orchestrator`](crate::orchestrator::Orchestrator) and, optionally,
/// the [`QueryAnalyzer`](crate::analyzer::QueryAnalyzer).
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for the conversation, blocking until the
    /// full text is available.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<String>;

    /// Generate a completion as a stream of text chunks. The stream ends
    /// when the provider signals completion; dropping it cancels the
    /// generation.
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<ChunkStream>;
}
