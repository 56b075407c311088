//! # Fact Recall CLI (`recall`)
//!
//! The `recall` binary is the reference interface for Fact Recall. It
//! indexes facts, searches them, and answers questions grounded on the
//! retrieved facts.
//!
//! ## Usage
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database schema |
//! | `recall add <owner> "<fact>"` | Index one fact |
//! | `recall search <owner> "<query>"` | Rank stored facts by similarity |
//! | `recall ask <owner> "<question>"` | Grounded answer (add `--stream`) |
//! | `recall stats <owner>` | Document counts per type |
//! | `recall forget <owner>` | Delete facts by metadata scope |
//!
//! ## Examples
//!
//! ```bash
//! recall init
//! recall add u1 "annual income is 5,000,000 yen" --type profile --category income --year 2025 --replace
//! recall search u1 "how much do I earn"
//! recall ask u1 "can I claim a medical expenses deduction?" --stream
//! recall forget u1 --category income --year 2024
//! ```

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use fact_recall::config::{load_config, Config};
use fact_recall::providers::{create_embedding_provider, create_generative_provider};
use fact_recall::db;
use fact_recall::sqlite_store::SqliteVectorStore;
use fact_recall_core::analyzer::QueryAnalyzer;
use fact_recall_core::models::{
    DocumentMetadata, DocumentType, MetadataFilter, NewDocument, SearchFilters,
};
use fact_recall_core::orchestrator::AnswerRequest;
use fact_recall_core::{KnowledgeBase, Orchestrator};

/// Fact Recall CLI — a selective-context retrieval engine for personal AI
/// advisors.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Fact Recall — a selective-context retrieval engine for personal AI advisors",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Index one fact for an owner.
    Add {
        /// Owner id the fact belongs to.
        owner: String,
        /// The fact text.
        content: String,
        /// Document type: profile, tax_doc, qa_history, simulation,
        /// custom_tab, uploaded_file, system.
        #[arg(long = "type", value_name = "TYPE", default_value = "profile")]
        doc_type: String,
        /// Category (e.g. income, family, housing).
        #[arg(long)]
        category: Option<String>,
        /// Tax year the fact applies to.
        #[arg(long)]
        year: Option<i32>,
        /// Delete existing facts in the same (type, category, year) scope
        /// first, so the latest write wins.
        #[arg(long)]
        replace: bool,
    },

    /// Rank stored facts by similarity to a query.
    Search {
        owner: String,
        query: String,
        /// Maximum results (defaults to retrieval.limit).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question grounded on the owner's stored facts.
    ///
    /// The finished exchange is persisted back as qa_history documents,
    /// so future questions can recall it.
    Ask {
        owner: String,
        query: String,
        /// Stream the answer chunk by chunk.
        #[arg(long)]
        stream: bool,
    },

    /// Show document counts per type.
    Stats { owner: String },

    /// Delete facts matching a metadata scope. At least one of --type,
    /// --category, or --year is required.
    Forget {
        owner: String,
        #[arg(long = "type", value_name = "TYPE")]
        doc_type: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        year: Option<i32>,
    },
}

fn parse_doc_type(name: &str) -> Result<DocumentType> {
    DocumentType::parse(name).with_context(|| {
        format!(
            "unknown document type '{name}'; expected one of: {}",
            DocumentType::ALL.map(|t| t.as_str()).join(", ")
        )
    })
}

async fn open_knowledge_base(config: &Config) -> Result<Arc<KnowledgeBase>> {
    let pool = db::connect(&config.db.path).await?;
    let store = Arc::new(SqliteVectorStore::new(pool));
    let embedder = create_embedding_provider(&config.embedding)?;
    Ok(Arc::new(KnowledgeBase::new(embedder, store)))
}

fn build_orchestrator(config: &Config, knowledge: Arc<KnowledgeBase>) -> Result<Orchestrator> {
    let generator = create_generative_provider(&config.generation)?;
    let analyzer = QueryAnalyzer::with_provider(generator.clone());
    Ok(Orchestrator::new(knowledge, analyzer, generator)
        .with_retrieval(config.retrieval.limit, config.retrieval.similarity_threshold))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            db::init_schema(&pool).await?;
            println!("initialized {}", config.db.path.display());
        }

        Commands::Add {
            owner,
            content,
            doc_type,
            category,
            year,
            replace,
        } => {
            let doc_type = parse_doc_type(&doc_type)?;
            let knowledge = open_knowledge_base(&config).await?;

            let mut metadata = DocumentMetadata::new(doc_type);
            metadata.category = category.clone();
            metadata.year = year;

            if replace {
                let scope = MetadataFilter {
                    types: Some(vec![doc_type]),
                    category,
                    year,
                };
                knowledge.delete_documents(&owner, &scope).await?;
            }

            let id = knowledge.add_document(&owner, &content, metadata).await?;
            println!("indexed {id}");
        }

        Commands::Search { owner, query, limit } => {
            let knowledge = open_knowledge_base(&config).await?;
            let filters = SearchFilters {
                limit: limit.unwrap_or(config.retrieval.limit),
                similarity_threshold: config.retrieval.similarity_threshold,
                ..Default::default()
            };

            let results = knowledge.search(&owner, &query, &filters).await;
            if results.is_empty() {
                println!("no matching facts");
            }
            for doc in results {
                println!(
                    "{:5.1}%  [{}]  {}",
                    f64::from(doc.similarity) * 100.0,
                    doc.metadata.doc_type,
                    doc.content
                );
            }
        }

        Commands::Ask { owner, query, stream } => {
            let knowledge = open_knowledge_base(&config).await?;
            let orchestrator = build_orchestrator(&config, knowledge.clone())?;

            let mut request = AnswerRequest::new(&owner, &query);
            request.system_prompt = config.retrieval.system_prompt.as_deref();
            request.options.temperature = config.generation.temperature;
            request.options.max_tokens = config.generation.max_tokens;

            let answer_text = if stream {
                let grounded = orchestrator.answer_stream(&request).await?;
                let mut stream = grounded.stream;
                let mut full = String::new();
                let mut stdout = std::io::stdout();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    print!("{chunk}");
                    stdout.flush()?;
                    full.push_str(&chunk);
                }
                println!();
                full
            } else {
                let grounded = orchestrator.answer(&request).await?;
                println!("{}", grounded.text);
                grounded.text
            };

            // Persist the exchange so future turns can recall it.
            let qa = DocumentMetadata::new(DocumentType::QaHistory);
            knowledge
                .add_documents(
                    &owner,
                    vec![
                        NewDocument::new(format!("Q: {query}"), qa.clone()),
                        NewDocument::new(format!("A: {answer_text}"), qa),
                    ],
                )
                .await?;
        }

        Commands::Stats { owner } => {
            let knowledge = open_knowledge_base(&config).await?;
            let stats = knowledge.stats(&owner).await?;
            println!("total: {}", stats.total);
            for (doc_type, count) in &stats.by_type {
                println!("  {doc_type}: {count}");
            }
        }

        Commands::Forget {
            owner,
            doc_type,
            category,
            year,
        } => {
            let types = match doc_type {
                Some(name) => Some(vec![parse_doc_type(&name)?]),
                None => None,
            };
            if types.is_none() && category.is_none() && year.is_none() {
                bail!("refusing to wipe the whole pool without at least one filter; pass --type, --category, or --year");
            }

            let knowledge = open_knowledge_base(&config).await?;
            knowledge
                .delete_documents(&owner, &MetadataFilter { types, category, year })
                .await?;
            println!("deleted matching facts for {owner}");
        }
    }

    Ok(())
}
