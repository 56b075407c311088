//! Storage abstraction for the knowledge base.
//!
//! The [`VectorStore`] trait defines every storage operation the retrieval
//! pipeline needs, enabling pluggable backends (in-memory, SQLite, a
//! remote vector database). Implementations must be `Send + Sync`.
//!
//! Owner scoping is part of the trait surface, not caller discipline:
//! every operation that can touch more than one document takes an explicit
//! `owner_id`, and an implementation must never let one owner's query
//! observe another owner's records.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    DocumentMetadata, DocumentType, KnowledgeDocument, KnowledgeStats, MetadataFilter,
};

/// A document as persisted: content plus its embedding and typed metadata.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
    pub created_at: DateTime<Utc>,
}

/// Inputs for one vector similarity query, minus the owner scope (which
/// is passed separately to keep it impossible to omit).
#[derive(Debug, Clone)]
pub struct VectorSearchParams {
    /// The query embedding.
    pub embedding: Vec<f32>,
    /// Restrict to these document types. `None` matches all types.
    pub types: Option<Vec<DocumentType>>,
    /// Restrict to this category.
    pub category: Option<String>,
    /// Restrict to this year.
    pub year: Option<i32>,
    /// Maximum number of results.
    pub limit: usize,
    /// Minimum cosine similarity for a result to qualify.
    pub similarity_threshold: f32,
}

impl VectorSearchParams {
    /// The metadata portion of the query, reusable for row filtering.
    pub fn metadata_filter(&self) -> MetadataFilter {
        MetadataFilter {
            types: self.types.clone(),
            category: self.category.clone(),
            year: self.year,
        }
    }
}

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorStore::insert) | Persist one record |
/// | [`insert_many`](VectorStore::insert_many) | Persist a batch in one write |
/// | [`search`](VectorStore::search) | Top-K cosine similarity, filtered |
/// | [`update`](VectorStore::update) | Replace content+embedding (and optionally metadata) |
/// | [`delete`](VectorStore::delete) | Delete one record by id |
/// | [`delete_matching`](VectorStore::delete_matching) | Delete an owner's records by metadata scope |
/// | [`stats`](VectorStore::stats) | Per-owner document counts |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a batch of records as one write.
    async fn insert_many(&self, records: Vec<DocumentRecord>) -> Result<()>;

    /// Persist one record. Default delegates to a one-element batch.
    async fn insert(&self, record: DocumentRecord) -> Result<()> {
        self.insert_many(vec![record]).await
    }

    /// Return the owner's documents most similar to the query embedding,
    /// ordered by similarity descending. Equal scores keep the store's
    /// own ordering; no secondary sort key is imposed.
    async fn search(
        &self,
        owner_id: &str,
        params: &VectorSearchParams,
    ) -> Result<Vec<KnowledgeDocument>>;

    /// Replace a document's content and embedding together. Metadata is
    /// replaced only when supplied. Fails if the id does not exist.
    async fn update(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: Option<&DocumentMetadata>,
    ) -> Result<()>;

    /// Delete one record by id. Deleting an unknown id is a no-op.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete every record of `owner_id` inside the metadata scope.
    async fn delete_matching(&self, owner_id: &str, filter: &MetadataFilter) -> Result<()>;

    /// Count the owner's documents, total and per type.
    async fn stats(&self, owner_id: &str) -> Result<KnowledgeStats>;
}
