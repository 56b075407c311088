//! Core data models for stored facts and query analysis.
//!
//! These types flow through the whole pipeline: documents are written with
//! a [`DocumentMetadata`], retrieved as [`KnowledgeDocument`]s carrying a
//! query-time similarity, and queries are classified into a
//! [`QueryAnalysis`] that drives the retrieval filters.
//!
//! All classification sets are closed enums. Unknown values coming from
//! storage or from an LLM response are rejected at the boundary rather
//! than passed through.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of results for a generic search.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Default minimum similarity for a generic search.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

/// The kind of fact a document holds. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Basic user information (income, family situation, ...).
    Profile,
    /// Tax documents (returns, receipts, certificates).
    TaxDoc,
    /// Past question/answer exchanges.
    QaHistory,
    /// Simulation results.
    Simulation,
    /// User-defined tab content.
    CustomTab,
    /// Extracts from uploaded files.
    UploadedFile,
    /// System-generated facts.
    System,
}

impl DocumentType {
    /// Every variant, in a stable order. Used for stats and validation.
    pub const ALL: [DocumentType; 7] = [
        DocumentType::Profile,
        DocumentType::TaxDoc,
        DocumentType::QaHistory,
        DocumentType::Simulation,
        DocumentType::CustomTab,
        DocumentType::UploadedFile,
        DocumentType::System,
    ];

    /// The snake_case wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Profile => "profile",
            DocumentType::TaxDoc => "tax_doc",
            DocumentType::QaHistory => "qa_history",
            DocumentType::Simulation => "simulation",
            DocumentType::CustomTab => "custom_tab",
            DocumentType::UploadedFile => "uploaded_file",
            DocumentType::System => "system",
        }
    }

    /// Parse a storage name. Returns `None` for unknown values so store
    /// boundaries can reject them explicitly.
    pub fn parse(s: &str) -> Option<Self> {
        DocumentType::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Human-readable label used when rendering a context block.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Profile => "Profile",
            DocumentType::TaxDoc => "Tax document",
            DocumentType::QaHistory => "Past conversation",
            DocumentType::Simulation => "Simulation result",
            DocumentType::CustomTab => "Custom tab",
            DocumentType::UploadedFile => "Uploaded file",
            DocumentType::System => "System note",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How load-bearing a fact is for answering. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Critical,
    High,
    Medium,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Critical => "critical",
            Importance::High => "high",
            Importance::Medium => "medium",
            Importance::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Importance::Critical),
            "high" => Some(Importance::High),
            "medium" => Some(Importance::Medium),
            "low" => Some(Importance::Low),
            _ => None,
        }
    }
}

/// Typed metadata attached to every stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl DocumentMetadata {
    pub fn new(doc_type: DocumentType) -> Self {
        Self {
            doc_type,
            category: None,
            year: None,
            source: None,
            importance: None,
            tags: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A stored fact as returned from a similarity search.
///
/// `similarity` is computed at query time against one query embedding and
/// is never comparable across two different queries.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub created_at: DateTime<Utc>,
    pub similarity: f32,
}

/// Content and metadata for a document about to be indexed.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl NewDocument {
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// Filters for a similarity search. Omitted metadata fields match
/// everything; fields are ANDed.
#[derive(Debug, Clone)]
pub struct SearchFilters {
    pub types: Option<Vec<DocumentType>>,
    pub category: Option<String>,
    pub year: Option<i32>,
    pub limit: usize,
    pub similarity_threshold: f32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            types: None,
            category: None,
            year: None,
            limit: DEFAULT_SEARCH_LIMIT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl SearchFilters {
    /// The metadata portion of the filters, for delete scoping.
    pub fn metadata_filter(&self) -> MetadataFilter {
        MetadataFilter {
            types: self.types.clone(),
            category: self.category.clone(),
            year: self.year,
        }
    }
}

/// Metadata scope for bulk deletion: [`SearchFilters`] without the
/// limit/threshold knobs.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub types: Option<Vec<DocumentType>>,
    pub category: Option<String>,
    pub year: Option<i32>,
}

impl MetadataFilter {
    /// Whether a document's metadata falls inside this scope.
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&metadata.doc_type) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if metadata.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if metadata.year != Some(year) {
                return false;
            }
        }
        true
    }
}

/// What kind of answer a query is seeking. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    TaxCalculation,
    DeductionInquiry,
    FilingProcedure,
    GeneralAdvice,
    Simulation,
    DocumentRequest,
    ProfileInquiry,
    Other,
}

impl QueryIntent {
    /// Document types that usually answer this intent well.
    pub fn recommended_types(&self) -> &'static [DocumentType] {
        match self {
            QueryIntent::TaxCalculation => &[
                DocumentType::Profile,
                DocumentType::TaxDoc,
                DocumentType::Simulation,
            ],
            QueryIntent::DeductionInquiry => &[DocumentType::Profile, DocumentType::TaxDoc],
            QueryIntent::FilingProcedure => &[DocumentType::TaxDoc, DocumentType::QaHistory],
            QueryIntent::GeneralAdvice => &[DocumentType::Profile, DocumentType::QaHistory],
            QueryIntent::Simulation => &[DocumentType::Profile, DocumentType::Simulation],
            QueryIntent::DocumentRequest => &[DocumentType::TaxDoc],
            QueryIntent::ProfileInquiry => &[DocumentType::Profile],
            QueryIntent::Other => &[DocumentType::Profile, DocumentType::QaHistory],
        }
    }
}

/// Structured retrieval intent produced by the query analyzer.
/// Ephemeral — never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub types: Vec<DocumentType>,
    pub category: Option<String>,
    pub year: Option<i32>,
    pub intent: QueryIntent,
    pub confidence: f32,
}

/// Per-owner document counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeStats {
    pub total: usize,
    pub by_type: BTreeMap<DocumentType, usize>,
}
