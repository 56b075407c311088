//! In-memory [`VectorStore`] implementation for testing and embedded use.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Search is
//! brute-force cosine similarity over the owner's stored vectors.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RecallError, Result};
use crate::models::{DocumentMetadata, KnowledgeDocument, KnowledgeStats, MetadataFilter};

use super::{DocumentRecord, VectorSearchParams, VectorStore};

/// In-memory store. Cheap to construct, fully isolated per instance.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<Vec<DocumentRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all owners. Test helper.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert_many(&self, records: Vec<DocumentRecord>) -> Result<()> {
        self.records.write().unwrap().extend(records);
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        params: &VectorSearchParams,
    ) -> Result<Vec<KnowledgeDocument>> {
        let filter = params.metadata_filter();
        let records = self.records.read().unwrap();

        let mut results: Vec<KnowledgeDocument> = records
            .iter()
            .filter(|r| r.owner_id == owner_id && filter.matches(&r.metadata))
            .filter_map(|r| {
                let similarity = cosine_similarity(&params.embedding, &r.embedding);
                if similarity >= params.similarity_threshold {
                    Some(KnowledgeDocument {
                        id: r.id.clone(),
                        owner_id: r.owner_id.clone(),
                        content: r.content.clone(),
                        metadata: r.metadata.clone(),
                        created_at: r.created_at,
                        similarity,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(params.limit);

        Ok(results)
    }

    async fn update(
        &self,
        id: &str,
        content: &str,
        embedding: &[f32],
        metadata: Option<&DocumentMetadata>,
    ) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RecallError::Store(format!("no document with id {id}")))?;

        record.content = content.to_owned();
        record.embedding = embedding.to_vec();
        if let Some(metadata) = metadata {
            record.metadata = metadata.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.records.write().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_matching(&self, owner_id: &str, filter: &MetadataFilter) -> Result<()> {
        self.records
            .write()
            .unwrap()
            .retain(|r| r.owner_id != owner_id || !filter.matches(&r.metadata));
        Ok(())
    }

    async fn stats(&self, owner_id: &str) -> Result<KnowledgeStats> {
        let records = self.records.read().unwrap();
        let mut stats = KnowledgeStats::default();
        for record in records.iter().filter(|r| r.owner_id == owner_id) {
            stats.total += 1;
            *stats.by_type.entry(record.metadata.doc_type).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::DocumentType;

    fn record(id: &str, owner: &str, embedding: Vec<f32>, metadata: DocumentMetadata) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            owner_id: owner.to_string(),
            content: format!("content of {id}"),
            embedding,
            metadata,
            created_at: Utc::now(),
        }
    }

    fn params(embedding: Vec<f32>) -> VectorSearchParams {
        VectorSearchParams {
            embedding,
            types: None,
            category: None,
            year: None,
            limit: 5,
            similarity_threshold: 0.0,
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        let profile = DocumentMetadata::new(DocumentType::Profile);
        store
            .insert_many(vec![
                record("far", "u1", vec![0.0, 1.0], profile.clone()),
                record("near", "u1", vec![1.0, 0.1], profile.clone()),
                record("exact", "u1", vec![1.0, 0.0], profile),
            ])
            .await
            .unwrap();

        let results = store.search("u1", &params(vec![1.0, 0.0])).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_never_crosses_owners() {
        let store = InMemoryVectorStore::new();
        let profile = DocumentMetadata::new(DocumentType::Profile);
        store
            .insert(record("a", "alice", vec![1.0, 0.0], profile.clone()))
            .await
            .unwrap();
        store
            .insert(record("b", "bob", vec![1.0, 0.0], profile))
            .await
            .unwrap();

        let results = store.search("alice", &params(vec![1.0, 0.0])).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_search_applies_threshold_and_limit() {
        let store = InMemoryVectorStore::new();
        let profile = DocumentMetadata::new(DocumentType::Profile);
        for i in 0..10 {
            store
                .insert(record(&format!("d{i}"), "u1", vec![1.0, 0.0], profile.clone()))
                .await
                .unwrap();
        }

        let mut p = params(vec![1.0, 0.0]);
        p.limit = 3;
        assert_eq!(store.search("u1", &p).await.unwrap().len(), 3);

        // No real similarity exceeds 1.0.
        p.similarity_threshold = 1.1;
        assert!(store.search("u1", &p).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_metadata() {
        let store = InMemoryVectorStore::new();
        store
            .insert_many(vec![
                record(
                    "income24",
                    "u1",
                    vec![1.0, 0.0],
                    DocumentMetadata::new(DocumentType::Profile)
                        .with_category("income")
                        .with_year(2024),
                ),
                record(
                    "housing",
                    "u1",
                    vec![1.0, 0.0],
                    DocumentMetadata::new(DocumentType::Profile).with_category("housing"),
                ),
                record(
                    "receipt",
                    "u1",
                    vec![1.0, 0.0],
                    DocumentMetadata::new(DocumentType::TaxDoc).with_year(2024),
                ),
            ])
            .await
            .unwrap();

        let mut p = params(vec![1.0, 0.0]);
        p.types = Some(vec![DocumentType::Profile]);
        p.category = Some("income".to_string());
        p.year = Some(2024);

        let results = store.search("u1", &p).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "income24");
    }

    #[tokio::test]
    async fn test_update_replaces_content_and_patches_metadata() {
        let store = InMemoryVectorStore::new();
        let metadata = DocumentMetadata::new(DocumentType::Profile).with_category("income");
        store
            .insert(record("doc", "u1", vec![1.0, 0.0], metadata))
            .await
            .unwrap();

        // Content+embedding only: metadata untouched.
        store
            .update("doc", "new content", &[0.0, 1.0], None)
            .await
            .unwrap();
        let results = store.search("u1", &params(vec![0.0, 1.0])).await.unwrap();
        assert_eq!(results[0].content, "new content");
        assert_eq!(results[0].metadata.category.as_deref(), Some("income"));

        // Unknown id fails.
        let err = store.update("ghost", "x", &[1.0], None).await.unwrap_err();
        assert!(matches!(err, RecallError::Store(_)));
    }

    #[tokio::test]
    async fn test_delete_matching_scopes_to_owner() {
        let store = InMemoryVectorStore::new();
        let income = DocumentMetadata::new(DocumentType::Profile).with_category("income");
        store
            .insert_many(vec![
                record("mine", "alice", vec![1.0], income.clone()),
                record("theirs", "bob", vec![1.0], income),
            ])
            .await
            .unwrap();

        let filter = MetadataFilter {
            category: Some("income".to_string()),
            ..Default::default()
        };
        store.delete_matching("alice", &filter).await.unwrap();

        assert!(store.search("alice", &params(vec![1.0])).await.unwrap().is_empty());
        assert_eq!(store.search("bob", &params(vec![1.0])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_counts_by_type() {
        let store = InMemoryVectorStore::new();
        store
            .insert_many(vec![
                record("p1", "u1", vec![1.0], DocumentMetadata::new(DocumentType::Profile)),
                record("p2", "u1", vec![1.0], DocumentMetadata::new(DocumentType::Profile)),
                record("q1", "u1", vec![1.0], DocumentMetadata::new(DocumentType::QaHistory)),
                record("x1", "u2", vec![1.0], DocumentMetadata::new(DocumentType::Profile)),
            ])
            .await
            .unwrap();

        let stats = store.stats("u1").await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type.get(&DocumentType::Profile), Some(&2));
        assert_eq!(stats.by_type.get(&DocumentType::QaHistory), Some(&1));
        assert_eq!(stats.by_type.get(&DocumentType::TaxDoc), None);
    }
}
