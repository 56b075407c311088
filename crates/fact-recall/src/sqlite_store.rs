//! SQLite-backed [`VectorStore`] implementation.
//!
//! One `knowledge_documents` table with typed metadata columns and a
//! little-endian f32 BLOB embedding column. Vector search fetches the
//! owner's rows and ranks them by cosine similarity in Rust — a
//! brute-force scan, fine for per-user fact pools (hundreds to low
//! thousands of rows).
//!
//! Unknown `doc_type`/`importance` values found in storage are rejected as
//! [`RecallError::Store`] instead of being passed through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use fact_recall_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use fact_recall_core::error::{RecallError, Result};
use fact_recall_core::models::{
    DocumentMetadata, DocumentType, Importance, KnowledgeDocument, KnowledgeStats,
    MetadataFilter,
};
use fact_recall_core::store::{DocumentRecord, VectorSearchParams, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn store_err(e: sqlx::Error) -> RecallError {
    RecallError::Store(e.to_string())
}

fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<DocumentMetadata> {
    let type_name: String = row.get("doc_type");
    let doc_type = DocumentType::parse(&type_name)
        .ok_or_else(|| RecallError::Store(format!("unknown document type in storage: {type_name}")))?;

    let importance = match row.get::<Option<String>, _>("importance") {
        Some(name) => Some(Importance::parse(&name).ok_or_else(|| {
            RecallError::Store(format!("unknown importance in storage: {name}"))
        })?),
        None => None,
    };

    let tags_json: String = row.get("tags_json");
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| RecallError::Store(format!("invalid tags in storage: {e}")))?;

    Ok(DocumentMetadata {
        doc_type,
        category: row.get("category"),
        year: row.get("year"),
        source: row.get("source"),
        importance,
        tags,
    })
}

fn row_created_at(row: &sqlx::sqlite::SqliteRow) -> DateTime<Utc> {
    let ts: i64 = row.get("created_at");
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_many(&self, records: Vec<DocumentRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        for record in &records {
            let tags_json = serde_json::to_string(&record.metadata.tags)
                .map_err(|e| RecallError::Store(e.to_string()))?;
            sqlx::query(
                r#"
                INSERT INTO knowledge_documents
                    (id, owner_id, content, embedding, doc_type, category, year,
                     source, importance, tags_json, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&record.owner_id)
            .bind(&record.content)
            .bind(vec_to_blob(&record.embedding))
            .bind(record.metadata.doc_type.as_str())
            .bind(&record.metadata.category)
            .bind(record.metadata.year)
            .bind(&record.metadata.source)
            .bind(record.metadata.importance.map(|i| i.as_str()))
            .bind(tags_json)
            .bind(record.created_at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        params: &VectorSearchParams,
    ) -> Result<Vec<KnowledgeDocument>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, content, embedding, doc_type, category, year,
                   source, importance, tags_json, created_at
            FROM knowledge_documents
            WHERE owner_id = ?
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let filter = params.metadata_filter();
        let mut results: Vec<KnowledgeDocument> = Vec::new();

        for row in &rows {
            let metadata = row_metadata(row)?;
            if !filter.matches(&metadata) {
                continue;
            }

            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(&params.embedding, &blob_to_vec(&blob));
            if similarity < params.similarity_threshold {
                continue;
            }

            results.push(KnowledgeDocument {
                id: row.get("id"),
                owner_id: row.get("owner_id"),
                content: row.get("content"),
                metadata,
                created_at: row_created_at(row),
                similarity,
            });
        }

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
        let result = if let Some(metadata) = metadata {
            let tags_json = serde_json::to_string(&metadata.tags)
                .map_err(|e| RecallError::Store(e.to_string()))?;
            sqlx::query(
                r#"
                UPDATE knowledge_documents
                SET content = ?, embedding = ?, doc_type = ?, category = ?,
                    year = ?, source = ?, importance = ?, tags_json = ?
                WHERE id = ?
                "#,
            )
            .bind(content)
            .bind(vec_to_blob(embedding))
            .bind(metadata.doc_type.as_str())
            .bind(&metadata.category)
            .bind(metadata.year)
            .bind(&metadata.source)
            .bind(metadata.importance.map(|i| i.as_str()))
            .bind(tags_json)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?
        } else {
            sqlx::query("UPDATE knowledge_documents SET content = ?, embedding = ? WHERE id = ?")
                .bind(content)
                .bind(vec_to_blob(embedding))
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(store_err)?
        };

        if result.rows_affected() == 0 {
            return Err(RecallError::Store(format!("no document with id {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM knowledge_documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete_matching(&self, owner_id: &str, filter: &MetadataFilter) -> Result<()> {
        // Resolve the scope to ids in Rust (the type filter is a set), then
        // delete in one transaction.
        let rows = sqlx::query(
            "SELECT id, doc_type, category, year FROM knowledge_documents WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut doomed: Vec<String> = Vec::new();
        for row in &rows {
            let type_name: String = row.get("doc_type");
            let doc_type = DocumentType::parse(&type_name).ok_or_else(|| {
                RecallError::Store(format!("unknown document type in storage: {type_name}"))
            })?;
            let mut metadata = DocumentMetadata::new(doc_type);
            metadata.category = row.get("category");
            metadata.year = row.get("year");
            if filter.matches(&metadata) {
                doomed.push(row.get("id"));
            }
        }

        if doomed.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        for id in &doomed {
            sqlx::query("DELETE FROM knowledge_documents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;
        }
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn stats(&self, owner_id: &str) -> Result<KnowledgeStats> {
        let rows = sqlx::query(
            "SELECT doc_type, COUNT(*) AS n FROM knowledge_documents WHERE owner_id = ? GROUP BY doc_type",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let mut stats = KnowledgeStats::default();
        for row in &rows {
            let type_name: String = row.get("doc_type");
            let doc_type = DocumentType::parse(&type_name).ok_or_else(|| {
                RecallError::Store(format!("unknown document type in storage: {type_name}"))
            })?;
            let n: i64 = row.get("n");
            stats.by_type.insert(doc_type, n as usize);
            stats.total += n as usize;
        }
        Ok(stats)
    }
}
