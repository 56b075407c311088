//! Retrieval orchestration: one grounded generation turn.
//!
//! The [`Orchestrator`] ties the pipeline together for a single user turn:
//! analyze the query, search the knowledge base with the derived filters,
//! render the context block, compose the system prompt, and drive the
//! generative provider — blocking or streamed.
//!
//! Persisting the finished exchange back into the knowledge base (as
//! `qa_history` documents) is deliberately the caller's job: a cancelled
//! stream must leave no side-effects, so nothing is written here.

use std::sync::Arc;

use crate::analyzer::QueryAnalyzer;
use crate::context::{compose_system_prompt, render_context};
use crate::error::Result;
use crate::generation::{ChatMessage, ChunkStream, GenerateOptions, GenerativeProvider};
use crate::knowledge::KnowledgeBase;
use crate::models::{KnowledgeDocument, QueryAnalysis, SearchFilters};

/// Default number of facts retrieved per turn.
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// Default minimum similarity for a fact to enter the context block.
/// Deliberately stricter than the generic search default: a fact that
/// reaches the prompt should pull its weight.
pub const DEFAULT_RETRIEVAL_THRESHOLD: f32 = 0.6;

/// Inputs for one grounded turn.
#[derive(Debug, Clone)]
pub struct AnswerRequest<'a> {
    pub owner_id: &'a str,
    pub query: &'a str,
    /// Prior conversation, oldest first. The query itself is appended by
    /// the orchestrator.
    pub history: &'a [ChatMessage],
    /// Replaces the default system prompt when set.
    pub system_prompt: Option<&'a str>,
    pub options: GenerateOptions,
}

impl<'a> AnswerRequest<'a> {
    pub fn new(owner_id: &'a str, query: &'a str) -> Self {
        Self {
            owner_id,
            query,
            history: &[],
            system_prompt: None,
            options: GenerateOptions::default(),
        }
    }
}

/// A completed grounded answer, with the evidence that produced it.
#[derive(Debug)]
pub struct GroundedAnswer {
    pub text: String,
    pub documents: Vec<KnowledgeDocument>,
    pub analysis: QueryAnalysis,
}

/// A streaming grounded answer. Dropping `stream` cancels the generation;
/// no further chunks are requested from the provider.
pub struct GroundedStream {
    pub stream: ChunkStream,
    pub documents: Vec<KnowledgeDocument>,
    pub analysis: QueryAnalysis,
}

/// Drives one grounded generation turn per call.
pub struct Orchestrator {
    knowledge: Arc<KnowledgeBase>,
    analyzer: QueryAnalyzer,
    generator: Arc<dyn GenerativeProvider>,
    limit: usize,
    similarity_threshold: f32,
}

impl Orchestrator {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        analyzer: QueryAnalyzer,
        generator: Arc<dyn GenerativeProvider>,
    ) -> Self {
        Self {
            knowledge,
            analyzer,
            generator,
            limit: DEFAULT_RETRIEVAL_LIMIT,
            similarity_threshold: DEFAULT_RETRIEVAL_THRESHOLD,
        }
    }

    /// Override the retrieval limit and similarity threshold.
    pub fn with_retrieval(mut self, limit: usize, similarity_threshold: f32) -> Self {
        self.limit = limit;
        self.similarity_threshold = similarity_threshold;
        self
    }

    /// Steps 1–3: analyze the query and fetch the matching facts.
    pub async fn retrieve(
        &self,
        owner_id: &str,
        query: &str,
    ) -> (QueryAnalysis, Vec<KnowledgeDocument>) {
        let analysis = self.analyzer.analyze(query).await;
        tracing::debug!(
            owner = owner_id,
            types = ?analysis.types,
            intent = ?analysis.intent,
            confidence = analysis.confidence,
            "query analyzed"
        );

        let filters = SearchFilters {
            types: Some(analysis.types.clone()),
            category: analysis.category.clone(),
            year: analysis.year,
            limit: self.limit,
            similarity_threshold: self.similarity_threshold,
        };
        let documents = self.knowledge.search(owner_id, query, &filters).await;
        (analysis, documents)
    }

    fn build_prompt(
        &self,
        request: &AnswerRequest<'_>,
        documents: &[KnowledgeDocument],
    ) -> (String, Vec<ChatMessage>) {
        let context_block = render_context(documents);
        let system = compose_system_prompt(request.system_prompt, &context_block);

        let mut messages = request.history.to_vec();
        messages.push(ChatMessage::user(request.query));
        (system, messages)
    }

    /// One grounded turn, blocking until the full answer is available.
    pub async fn answer(&self, request: &AnswerRequest<'_>) -> Result<GroundedAnswer> {
        let (analysis, documents) = self.retrieve(request.owner_id, request.query).await;
        let (system, messages) = self.build_prompt(request, &documents);

        let text = self
            .generator
            .generate(&messages, Some(&system), &request.options)
            .await?;

        Ok(GroundedAnswer {
            text,
            documents,
            analysis,
        })
    }

    /// One grounded turn as a chunk stream.
    ///
    /// Retrieval and prompt assembly happen before this returns; the
    /// returned documents let the caller attribute sources and persist the
    /// exchange after the stream is fully consumed.
    pub async fn answer_stream(&self, request: &AnswerRequest<'_>) -> Result<GroundedStream> {
        let (analysis, documents) = self.retrieve(request.owner_id, request.query).await;
        let (system, messages) = self.build_prompt(request, &documents);

        let stream = self
            .generator
            .generate_stream(&messages, Some(&system), &request.options)
            .await?;

        Ok(GroundedStream {
            stream,
            documents,
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::context::NO_CONTEXT_MARKER;
    use crate::embedding::EmbeddingProvider;
    use crate::models::{DocumentMetadata, DocumentType};
    use crate::store::memory::InMemoryVectorStore;

    /// Embeds every text to the same unit vector, so any stored document
    /// matches any query with similarity 1.0.
    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        fn model_name(&self) -> &str {
            "unit"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Records the system prompt it was handed, replies with a fixed text.
    struct RecordingGenerator {
        seen_system: Mutex<Vec<String>>,
    }

    impl RecordingGenerator {
        fn new() -> Self {
            Self {
                seen_system: Mutex::new(Vec::new()),
            }
        }
        fn last_system(&self) -> String {
            self.seen_system.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenerativeProvider for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            system: Option<&str>,
            _options: &GenerateOptions,
        ) -> Result<String> {
            self.seen_system
                .lock()
                .unwrap()
                .push(system.unwrap_or_default().to_string());
            Ok("the answer".to_string())
        }
        async fn generate_stream(
            &self,
            messages: &[ChatMessage],
            system: Option<&str>,
            options: &GenerateOptions,
        ) -> Result<ChunkStream> {
            let text = self.generate(messages, system, options).await?;
            Ok(futures::stream::iter(vec![Ok("the ".to_string()), Ok(text)]).boxed())
        }
    }

    fn orchestrator(
        store: Arc<InMemoryVectorStore>,
        generator: Arc<RecordingGenerator>,
    ) -> Orchestrator {
        let kb = Arc::new(KnowledgeBase::new(Arc::new(UnitEmbedder), store));
        Orchestrator::new(kb, QueryAnalyzer::new(), generator)
    }

    #[tokio::test]
    async fn test_answer_grounds_on_retrieved_facts() {
        let store = Arc::new(InMemoryVectorStore::new());
        let generator = Arc::new(RecordingGenerator::new());
        let orch = orchestrator(store.clone(), generator.clone());

        let kb = KnowledgeBase::new(Arc::new(UnitEmbedder), store);
        kb.add_document(
            "u1",
            "annual income is 5,000,000 yen",
            DocumentMetadata::new(DocumentType::Profile).with_category("income"),
        )
        .await
        .unwrap();

        let answer = orch.answer(&AnswerRequest::new("u1", "what is my salary")).await.unwrap();
        assert_eq!(answer.text, "the answer");
        assert_eq!(answer.documents.len(), 1);
        assert_eq!(answer.analysis.category.as_deref(), Some("income"));

        let system = generator.last_system();
        assert!(system.contains("annual income is 5,000,000 yen"));
        assert!(!system.contains(NO_CONTEXT_MARKER));
    }

    #[tokio::test]
    async fn test_empty_retrieval_renders_marker() {
        let store = Arc::new(InMemoryVectorStore::new());
        let generator = Arc::new(RecordingGenerator::new());
        let orch = orchestrator(store, generator.clone());

        let answer = orch.answer(&AnswerRequest::new("u1", "what is my salary")).await.unwrap();
        assert!(answer.documents.is_empty());
        assert!(generator.last_system().contains(NO_CONTEXT_MARKER));
    }

    #[tokio::test]
    async fn test_system_prompt_override() {
        let store = Arc::new(InMemoryVectorStore::new());
        let generator = Arc::new(RecordingGenerator::new());
        let orch = orchestrator(store, generator.clone());

        let mut request = AnswerRequest::new("u1", "hello");
        request.system_prompt = Some("Answer in one word.");
        orch.answer(&request).await.unwrap();
        assert!(generator.last_system().starts_with("Answer in one word."));
    }

    #[tokio::test]
    async fn test_answer_stream_yields_chunks_and_documents() {
        let store = Arc::new(InMemoryVectorStore::new());
        let generator = Arc::new(RecordingGenerator::new());
        let orch = orchestrator(store, generator);

        let grounded = orch
            .answer_stream(&AnswerRequest::new("u1", "what is my salary"))
            .await
            .unwrap();
        assert!(grounded.documents.is_empty());

        let chunks: Vec<String> = grounded
            .stream
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "the the answer");
    }
}
