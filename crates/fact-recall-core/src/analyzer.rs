//! Query analysis: turning a free-text question into a retrieval intent.
//!
//! Two tiers, always producing a [`QueryAnalysis`]:
//!
//! 1. A **keyword pass** that always runs: a fixed, ordered table of
//!    pattern groups maps topical keywords to document types, a category,
//!    an intent, and a confidence floor. Deterministic and cheap.
//! 2. An **AI-assisted pass** that runs only when the query looks complex
//!    (conditionals, comparisons, concession, scenario framing,
//!    preference, negation) and a generative provider was injected. The
//!    provider is asked for a single JSON object; the response is parsed
//!    strictly — either the full schema matches, or the AI result is
//!    discarded and the keyword result stands. No error ever propagates
//!    out of `analyze`.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::error::{RecallError, Result};
use crate::generation::{ChatMessage, GenerateOptions, GenerativeProvider};
use crate::models::{DocumentType, QueryAnalysis, QueryIntent};

/// One row of the keyword table: keywords plus what matching them
/// contributes to the analysis.
struct PatternGroup {
    keywords: &'static [&'static str],
    types: &'static [DocumentType],
    category: Option<&'static str>,
    intent: Option<QueryIntent>,
    confidence: f32,
}

/// Ordered keyword table. Later groups may overwrite the category and
/// intent of earlier ones; the confidence is the maximum matched floor.
const PATTERN_GROUPS: &[PatternGroup] = &[
    PatternGroup {
        keywords: &[
            "annual income",
            "income",
            "salary",
            "wages",
            "wage",
            "earnings",
            "compensation",
            "paycheck",
        ],
        types: &[DocumentType::Profile],
        category: Some("income"),
        intent: None,
        confidence: 0.9,
    },
    PatternGroup {
        keywords: &[
            "spouse", "husband", "wife", "married", "family", "dependent", "dependents", "child",
            "children", "kids", "parents",
        ],
        types: &[DocumentType::Profile],
        category: Some("family"),
        intent: None,
        confidence: 0.9,
    },
    PatternGroup {
        keywords: &[
            "tax return",
            "tax form",
            "withholding",
            "filing",
            "receipt",
            "receipts",
            "certificate",
            "statement",
        ],
        types: &[DocumentType::TaxDoc],
        category: None,
        intent: Some(QueryIntent::DocumentRequest),
        confidence: 0.95,
    },
    PatternGroup {
        keywords: &[
            "deduction",
            "deductible",
            "write-off",
            "donation",
            "charitable",
            "medical expenses",
            "social insurance",
        ],
        types: &[DocumentType::Profile, DocumentType::TaxDoc],
        category: None,
        intent: Some(QueryIntent::DeductionInquiry),
        confidence: 0.9,
    },
    PatternGroup {
        keywords: &[
            "simulation",
            "simulate",
            "estimate",
            "projection",
            "calculate",
            "how much",
        ],
        types: &[DocumentType::Profile, DocumentType::Simulation],
        category: None,
        intent: Some(QueryIntent::Simulation),
        confidence: 0.85,
    },
    PatternGroup {
        keywords: &[
            "housing",
            "mortgage",
            "home loan",
            "house",
            "apartment",
            "real estate",
            "rent",
            "property",
        ],
        types: &[DocumentType::Profile],
        category: Some("housing"),
        intent: None,
        confidence: 0.9,
    },
    PatternGroup {
        keywords: &[
            "investment",
            "invest",
            "stock",
            "stocks",
            "dividend",
            "nisa",
            "ideco",
            "brokerage",
            "portfolio",
            "etf",
        ],
        types: &[DocumentType::Profile],
        category: Some("investment"),
        intent: None,
        confidence: 0.9,
    },
    PatternGroup {
        keywords: &["insurance", "premium", "policy"],
        types: &[DocumentType::Profile],
        category: Some("insurance"),
        intent: None,
        confidence: 0.9,
    },
    PatternGroup {
        keywords: &[
            "earlier",
            "before",
            "previously",
            "last time",
            "you said",
            "we talked",
            "we discussed",
            "history",
        ],
        types: &[DocumentType::QaHistory],
        category: None,
        intent: None,
        confidence: 0.8,
    },
];

/// Secondary intent patterns, applied only when no group set an intent.
const INTENT_PATTERNS: &[(&[&str], QueryIntent)] = &[
    (
        &["calculate", "how much", "tax bill", "what do i owe", "owe"],
        QueryIntent::TaxCalculation,
    ),
    (
        &["how do i", "how to", "procedure", "steps", "process"],
        QueryIntent::FilingProcedure,
    ),
    (
        &["tell me", "explain", "what is", "should i", "advice"],
        QueryIntent::GeneralAdvice,
    ),
    (
        &["my ", "about me", "my own", "profile"],
        QueryIntent::ProfileInquiry,
    ),
];

/// Regexes marking a query as complex enough to warrant the AI pass.
/// Applied to the lowercased query.
const COMPLEX_PATTERNS: &[&str] = &[
    r"\bif\b.+\b(then|what|how|would|happens?)\b",
    r"\b(vs\.?|versus|compared (to|with)|difference between)\b",
    r"\b(although|even though)\b",
    r"\bin (the )?case of\b",
    r"\bwhat happens\b",
    r"\brather than\b|\binstead of\b",
    r"\bnot\b.+\bbut\b",
];

/// Confidence when no pattern matched at all.
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// Two-tier query classifier.
pub struct QueryAnalyzer {
    provider: Option<Arc<dyn GenerativeProvider>>,
    year_pattern: Regex,
    complex_patterns: Vec<Regex>,
}

impl QueryAnalyzer {
    /// Keyword-only analyzer: the AI-assisted pass never runs.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Analyzer with an AI-assisted pass for complex queries.
    pub fn with_provider(provider: Arc<dyn GenerativeProvider>) -> Self {
        Self::build(Some(provider))
    }

    fn build(provider: Option<Arc<dyn GenerativeProvider>>) -> Self {
        Self {
            provider,
            year_pattern: Regex::new(r"\b(19|20)\d{2}\b").expect("year pattern"),
            complex_patterns: COMPLEX_PATTERNS
                .iter()
                .map(|p| Regex::new(p).expect("complex pattern"))
                .collect(),
        }
    }

    /// Classify a query. Infallible: on any AI-pass failure the keyword
    /// result is returned unchanged.
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        let keyword = self.keyword_pass(query);

        if self.is_complex(query) {
            if let Some(provider) = &self.provider {
                match self.ai_pass(provider.as_ref(), query).await {
                    Ok(ai) => return merge(keyword, ai),
                    Err(e) => {
                        tracing::warn!(error = %e, "AI-assisted analysis failed, using keyword result");
                    }
                }
            }
        }

        keyword
    }

    /// Fast deterministic classification from the keyword table.
    pub fn keyword_pass(&self, query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();

        let mut types: Vec<DocumentType> = Vec::new();
        let mut category: Option<String> = None;
        let mut intent = QueryIntent::Other;
        let mut confidence: f32 = 0.0;

        for group in PATTERN_GROUPS {
            if group.keywords.iter().any(|k| lower.contains(k)) {
                for t in group.types {
                    if !types.contains(t) {
                        types.push(*t);
                    }
                }
                if let Some(c) = group.category {
                    category = Some(c.to_string());
                }
                if let Some(i) = group.intent {
                    intent = i;
                }
                confidence = confidence.max(group.confidence);
            }
        }

        let year = self.extract_year(&lower);

        if intent == QueryIntent::Other {
            for (keywords, candidate) in INTENT_PATTERNS {
                if keywords.iter().any(|k| lower.contains(k)) {
                    intent = *candidate;
                    break;
                }
            }
        }

        if types.is_empty() {
            types.push(DocumentType::Profile);
            confidence = FALLBACK_CONFIDENCE;
        }

        QueryAnalysis {
            types,
            category,
            year,
            intent,
            confidence,
        }
    }

    /// Explicit 4-digit year, or a relative-year word resolved against the
    /// current calendar year.
    fn extract_year(&self, lower: &str) -> Option<i32> {
        if let Some(m) = self.year_pattern.find(lower) {
            return m.as_str().parse().ok();
        }

        let current = Utc::now().year();
        if lower.contains("this year") || lower.contains("current year") {
            Some(current)
        } else if lower.contains("next year") {
            Some(current + 1)
        } else if lower.contains("last year") || lower.contains("previous year") {
            Some(current - 1)
        } else {
            None
        }
    }

    /// Whether the query needs the AI pass.
    fn is_complex(&self, query: &str) -> bool {
        let lower = query.to_lowercase();
        self.complex_patterns.iter().any(|p| p.is_match(&lower))
    }

    async fn ai_pass(
        &self,
        provider: &dyn GenerativeProvider,
        query: &str,
    ) -> Result<AiAnalysis> {
        let prompt = analysis_prompt(query);
        let options = GenerateOptions {
            temperature: 0.1,
            max_tokens: 256,
        };
        let response = provider
            .generate(&[ChatMessage::user(prompt)], None, &options)
            .await?;
        parse_ai_analysis(&response)
    }
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// AI-pass response schema. Closed enums: an unknown type or intent value
/// fails the whole parse and triggers the keyword fallback.
#[derive(Debug, Deserialize)]
struct AiAnalysis {
    types: Vec<DocumentType>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    intent: Option<QueryIntent>,
    #[serde(default)]
    confidence: Option<f32>,
}

fn analysis_prompt(query: &str) -> String {
    format!(
        r#"You are the query-classification step of a personal finance advisor.
Decide which of the user's stored information is needed to answer their question.

Question: "{query}"

Reply with a single JSON object in exactly this shape:
{{
  "types": ["profile", "tax_doc", "qa_history", "simulation", "custom_tab"],
  "category": "income",
  "year": 2025,
  "intent": "tax_calculation",
  "confidence": 0.9
}}

types: required document types, one or more of profile, tax_doc, qa_history, simulation, custom_tab, uploaded_file, system
category: one of income, family, housing, insurance, investment, deduction, other; omit when unclear
year: the tax year, only when the question names one
intent: one of tax_calculation, deduction_inquiry, filing_procedure, general_advice, simulation, document_request, profile_inquiry, other
confidence: 0.0-1.0

Return only the JSON object. No explanation."#
    )
}

/// Parse the provider's free-text reply into the schema, strictly.
fn parse_ai_analysis(response: &str) -> Result<AiAnalysis> {
    let object = extract_json_object(response).ok_or_else(|| {
        RecallError::MalformedResponse("no JSON object in analysis reply".to_string())
    })?;
    serde_json::from_str(object)
        .map_err(|e| RecallError::MalformedResponse(format!("analysis schema mismatch: {e}")))
}

/// Extract the first balanced top-level JSON object from free text,
/// tolerating leading and trailing prose. String literals (including
/// escaped quotes) are skipped when tracking brace depth.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Combine the keyword and AI results: types are unioned, the remaining
/// fields prefer the AI values when present.
fn merge(keyword: QueryAnalysis, ai: AiAnalysis) -> QueryAnalysis {
    let mut types = keyword.types;
    for t in ai.types {
        if !types.contains(&t) {
            types.push(t);
        }
    }

    QueryAnalysis {
        types,
        category: ai.category.or(keyword.category),
        year: ai.year.or(keyword.year),
        intent: ai.intent.unwrap_or(keyword.intent),
        confidence: ai
            .confidence
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(keyword.confidence),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::generation::ChunkStream;

    struct CannedGenerator {
        response: Option<String>,
        calls: AtomicUsize,
    }

    impl CannedGenerator {
        fn replying(response: &str) -> Self {
            Self {
                response: Some(response.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                response: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for CannedGenerator {
        fn model_name(&self) -> &str {
            "canned"
        }
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _system: Option<&str>,
            _options: &GenerateOptions,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response
                .clone()
                .ok_or_else(|| RecallError::Generation("mock outage".to_string()))
        }
        async fn generate_stream(
            &self,
            messages: &[ChatMessage],
            system: Option<&str>,
            options: &GenerateOptions,
        ) -> Result<ChunkStream> {
            let text = self.generate(messages, system, options).await?;
            Ok(futures::stream::iter(vec![Ok(text)]).boxed())
        }
    }

    #[test]
    fn test_income_keywords() {
        let analyzer = QueryAnalyzer::new();
        for query in ["What is my annual income?", "How does my salary compare"] {
            let analysis = analyzer.keyword_pass(query);
            assert!(analysis.types.contains(&DocumentType::Profile), "{query}");
            assert_eq!(analysis.category.as_deref(), Some("income"), "{query}");
            assert!(analysis.confidence >= 0.9, "{query}");
        }
    }

    #[test]
    fn test_no_match_defaults_to_profile() {
        let analysis = QueryAnalyzer::new().keyword_pass("zzz qqq");
        assert_eq!(analysis.types, vec![DocumentType::Profile]);
        assert!((analysis.confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(analysis.intent, QueryIntent::Other);
    }

    #[test]
    fn test_deduction_sets_intent_and_both_types() {
        let analysis = QueryAnalyzer::new().keyword_pass("Can I claim a medical expenses deduction?");
        assert!(analysis.types.contains(&DocumentType::Profile));
        assert!(analysis.types.contains(&DocumentType::TaxDoc));
        assert_eq!(analysis.intent, QueryIntent::DeductionInquiry);
    }

    #[test]
    fn test_past_conversation_keywords() {
        let analysis = QueryAnalyzer::new().keyword_pass("What did we discuss last time?");
        assert!(analysis.types.contains(&DocumentType::QaHistory));
    }

    #[test]
    fn test_explicit_year() {
        let analysis = QueryAnalyzer::new().keyword_pass("my income for 2023");
        assert_eq!(analysis.year, Some(2023));
    }

    #[test]
    fn test_relative_years() {
        let analyzer = QueryAnalyzer::new();
        let current = Utc::now().year();
        assert_eq!(analyzer.keyword_pass("income this year").year, Some(current));
        assert_eq!(analyzer.keyword_pass("income next year").year, Some(current + 1));
        assert_eq!(analyzer.keyword_pass("income last year").year, Some(current - 1));
    }

    #[test]
    fn test_secondary_intent_only_when_unset() {
        let analyzer = QueryAnalyzer::new();
        // "how much" hits the simulation group first.
        let analysis = analyzer.keyword_pass("how much tax");
        assert_eq!(analysis.intent, QueryIntent::Simulation);
        // Procedure phrasing with no group intent.
        let analysis = analyzer.keyword_pass("what are the steps for my family situation");
        assert_eq!(analysis.intent, QueryIntent::FilingProcedure);
    }

    #[test]
    fn test_complex_detector() {
        let analyzer = QueryAnalyzer::new();
        assert!(analyzer.is_complex("if I change jobs, what happens to my tax"));
        assert!(analyzer.is_complex("NISA versus iDeCo"));
        assert!(analyzer.is_complex("renting rather than buying"));
        assert!(!analyzer.is_complex("what is my annual income"));
    }

    #[test]
    fn test_extract_json_object_from_prose() {
        let text = "Sure! Here you go:\n{\"a\": {\"b\": \"}\"}} trailing words";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": \"}\"}}"));
        assert_eq!(extract_json_object("no braces here"), None);
        assert_eq!(extract_json_object("{ unbalanced"), None);
    }

    #[tokio::test]
    async fn test_ai_pass_merges_types_and_prefers_ai_fields() {
        let provider = Arc::new(CannedGenerator::replying(
            r#"Here is the analysis:
{"types": ["simulation"], "category": "income", "year": 2026, "intent": "simulation", "confidence": 0.95}"#,
        ));
        let analyzer = QueryAnalyzer::with_provider(provider.clone());

        let analysis = analyzer
            .analyze("if I change jobs, what happens to my salary next year")
            .await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        // Union: keyword found Profile (salary), AI added Simulation.
        assert!(analysis.types.contains(&DocumentType::Profile));
        assert!(analysis.types.contains(&DocumentType::Simulation));
        assert_eq!(analysis.year, Some(2026));
        assert_eq!(analysis.intent, QueryIntent::Simulation);
        assert!((analysis.confidence - 0.95).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ai_failure_falls_back_to_keyword_result() {
        let provider = Arc::new(CannedGenerator::failing());
        let analyzer = QueryAnalyzer::with_provider(provider.clone());
        let query = "if I change jobs, what happens to my tax";

        let analysis = analyzer.analyze(query).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(analysis, analyzer.keyword_pass(query));
    }

    #[tokio::test]
    async fn test_unknown_enum_value_triggers_fallback() {
        let provider = Arc::new(CannedGenerator::replying(
            r#"{"types": ["profile", "bank_statement"], "intent": "other", "confidence": 0.9}"#,
        ));
        let analyzer = QueryAnalyzer::with_provider(provider);
        let query = "if I change jobs, what happens to my tax";

        let analysis = analyzer.analyze(query).await;
        assert_eq!(analysis, analyzer.keyword_pass(query));
    }

    #[tokio::test]
    async fn test_simple_query_never_calls_provider() {
        let provider = Arc::new(CannedGenerator::replying("{}"));
        let analyzer = QueryAnalyzer::with_provider(provider.clone());
        analyzer.analyze("what is my annual income").await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
