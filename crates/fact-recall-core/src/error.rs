//! Error taxonomy for the retrieval engine.
//!
//! Write-path failures (`Embedding`, `Store`) and generation failures
//! propagate to the caller — correctness of stored facts must not be
//! silently lost. Read-path degradations (a failed vector search, a failed
//! AI-assisted classification) are absorbed where they occur and never
//! surface as errors; see [`crate::knowledge::KnowledgeBase::search`] and
//! [`crate::analyzer::QueryAnalyzer::analyze`].

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = RecallError> = std::result::Result<T, E>;

/// All failures a provider or store can surface to the engine.
#[derive(Debug, Error)]
pub enum RecallError {
    /// The embedding provider failed to vectorize text. Fatal for the
    /// calling write operation.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// A write, update, or delete against the vector store failed. Fatal
    /// for that operation.
    #[error("vector store error: {0}")]
    Store(String),

    /// The generative provider failed. Surfaced to the orchestrator's
    /// caller.
    #[error("generative provider error: {0}")]
    Generation(String),

    /// A provider response did not match the expected shape. Only raised
    /// inside the AI-assisted analysis path, where it triggers the keyword
    /// fallback instead of propagating.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}
