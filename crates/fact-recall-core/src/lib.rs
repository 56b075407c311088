//! # Fact Recall Core
//!
//! Shared logic for Fact Recall, a selective-context retrieval engine:
//! data models, the error taxonomy, provider and store traits, the
//! knowledge base, query analysis, and retrieval orchestration.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies — all
//! I/O happens behind the injected provider and store traits, so it can be
//! embedded anywhere an async executor exists.
//!
//! ## Data Flow
//!
//! 1. The application indexes facts through
//!    [`knowledge::KnowledgeBase::add_document`] /
//!    [`add_documents`](knowledge::KnowledgeBase::add_documents): content
//!    is embedded by the injected [`embedding::EmbeddingProvider`] and
//!    persisted through the [`store::VectorStore`].
//! 2. On each user question, the [`analyzer::QueryAnalyzer`] classifies
//!    the query into a [`models::QueryAnalysis`] — document types,
//!    category, year, intent — via a deterministic keyword pass plus an
//!    optional LLM-assisted pass for complex phrasing.
//! 3. The [`orchestrator::Orchestrator`] turns the analysis into
//!    [`models::SearchFilters`], retrieves the few matching facts, renders
//!    the [`context`] block, and drives the
//!    [`generation::GenerativeProvider`] — blocking or streamed.
//! 4. The caller persists the finished exchange back as `qa_history`
//!    documents.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, metadata, filters, analysis types |
//! | [`error`] | `RecallError` taxonomy and propagation policy |
//! | [`embedding`] | `EmbeddingProvider` trait + vector utilities |
//! | [`generation`] | `GenerativeProvider` trait, chat types, streaming |
//! | [`store`] | `VectorStore` trait + in-memory implementation |
//! | [`knowledge`] | The document store (`KnowledgeBase`) |
//! | [`analyzer`] | Two-tier query classification |
//! | [`context`] | Context-block rendering and prompt composition |
//! | [`orchestrator`] | One grounded generation turn |

pub mod analyzer;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use analyzer::QueryAnalyzer;
pub use error::{RecallError, Result};
pub use knowledge::{KnowledgeBase, EMBED_BATCH_SIZE};
pub use models::{
    DocumentMetadata, DocumentType, Importance, KnowledgeDocument, KnowledgeStats,
    MetadataFilter, NewDocument, QueryAnalysis, QueryIntent, SearchFilters,
};
pub use orchestrator::{AnswerRequest, GroundedAnswer, GroundedStream, Orchestrator};
