//! The knowledge base: embed-then-write CRUD and similarity search over a
//! user's stored facts.
//!
//! [`KnowledgeBase`] owns no state of its own — it composes an injected
//! [`EmbeddingProvider`] and [`VectorStore`] and enforces the engine's
//! contracts on top of them:
//!
//! - every operation is scoped to one owner;
//! - content and embedding always change together;
//! - bulk indexing embeds in fixed-size batches ([`EMBED_BATCH_SIZE`]) with
//!   one store write per batch;
//! - write failures propagate, search failures degrade to an empty result.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::{RecallError, Result};
use crate::models::{
    DocumentMetadata, KnowledgeDocument, KnowledgeStats, MetadataFilter, NewDocument,
    SearchFilters,
};
use crate::store::{DocumentRecord, VectorSearchParams, VectorStore};

/// Number of documents vectorized per embedding call during bulk indexing.
///
/// This is a contract, not a tuning knob: batches are serialized to respect
/// provider rate limits, and callers must not assume unlimited embedding
/// concurrency.
pub const EMBED_BATCH_SIZE: usize = 10;

/// Document store over an embedding provider and a vector store.
pub struct KnowledgeBase {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed `content` and persist it as one new document.
    ///
    /// Returns the generated document id. Nothing is written when the
    /// embedding fails; the store write either fully succeeds or the error
    /// propagates.
    pub async fn add_document(
        &self,
        owner_id: &str,
        content: &str,
        metadata: DocumentMetadata,
    ) -> Result<String> {
        let embedding = self.embedder.embed(content).await?;
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_owned(),
            content: content.to_owned(),
            embedding,
            metadata,
            created_at: Utc::now(),
        };
        let id = record.id.clone();
        self.store.insert(record).await?;
        tracing::debug!(owner = owner_id, id = %id, "indexed document");
        Ok(id)
    }

    /// Index a set of documents in batches of [`EMBED_BATCH_SIZE`].
    ///
    /// Per batch: one embedding call covering the whole batch, then one
    /// bulk store write. Batches run strictly one after another. If a
    /// batch fails, the call aborts — documents from earlier successful
    /// batches remain persisted (partial success across batches is
    /// accepted; a batch itself is all-or-nothing).
    ///
    /// Empty input returns an empty id list without touching either
    /// collaborator.
    pub async fn add_documents(
        &self,
        owner_id: &str,
        documents: Vec<NewDocument>,
    ) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(documents.len());
        for batch in documents.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RecallError::Embedding(format!(
                    "expected {} vectors, provider returned {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            let now = Utc::now();
            let records: Vec<DocumentRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(doc, embedding)| DocumentRecord {
                    id: Uuid::new_v4().to_string(),
                    owner_id: owner_id.to_owned(),
                    content: doc.content.clone(),
                    embedding,
                    metadata: doc.metadata.clone(),
                    created_at: now,
                })
                .collect();
            let batch_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

            self.store.insert_many(records).await?;
            ids.extend(batch_ids);
            tracing::debug!(owner = owner_id, indexed = ids.len(), "bulk index progress");
        }

        Ok(ids)
    }

    /// Similarity search over the owner's documents.
    ///
    /// Never fails: a query-embedding or store failure is logged and
    /// degrades to an empty result, so a retrieval hiccup reads as "no
    /// relevant facts found" instead of crashing the turn.
    pub async fn search(
        &self,
        owner_id: &str,
        query: &str,
        filters: &SearchFilters,
    ) -> Vec<KnowledgeDocument> {
        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(owner = owner_id, error = %e, "query embedding failed, returning no results");
                return Vec::new();
            }
        };

        let params = VectorSearchParams {
            embedding,
            types: filters.types.clone(),
            category: filters.category.clone(),
            year: filters.year,
            limit: filters.limit,
            similarity_threshold: filters.similarity_threshold,
        };

        match self.store.search(owner_id, &params).await {
            Ok(documents) => {
                tracing::debug!(owner = owner_id, results = documents.len(), "search complete");
                documents
            }
            Err(e) => {
                tracing::warn!(owner = owner_id, error = %e, "vector search failed, degrading to empty result");
                Vec::new()
            }
        }
    }

    /// Re-embed `content` and replace the document. Metadata is replaced
    /// only when supplied; content and embedding always change together.
    pub async fn update_document(
        &self,
        id: &str,
        content: &str,
        metadata: Option<DocumentMetadata>,
    ) -> Result<()> {
        let embedding = self.embedder.embed(content).await?;
        self.store
            .update(id, content, &embedding, metadata.as_ref())
            .await
    }

    /// Delete one document by id.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    /// Delete every document of `owner_id` matching the metadata scope.
    ///
    /// This is the first half of the re-indexing workflow for mutable
    /// facts: delete the `(type, category, year)` scope, then
    /// [`add_documents`](Self::add_documents) the fresh content.
    pub async fn delete_documents(&self, owner_id: &str, filter: &MetadataFilter) -> Result<()> {
        self.store.delete_matching(owner_id, filter).await
    }

    /// Per-owner document counts.
    pub async fn stats(&self, owner_id: &str) -> Result<KnowledgeStats> {
        self.store.stats(owner_id).await
    }
}
