//! # Fact Recall
//!
//! **A selective-context retrieval engine for personal AI advisors.**
//!
//! Fact Recall stores a user's facts (profile fields, document extracts,
//! past Q&A, simulation results) as embedded documents and, on every
//! question, retrieves only the few facts that matter before handing a
//! grounded prompt to a chat model.
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Query    │──▶│ QueryAnalyzer │──▶│ KnowledgeBase │
//! │  (text)   │   │ keyword + AI  │   │ embed+search  │
//! └──────────┘   └───────────────┘   └──────┬───────┘
//!                                           │ top-K facts
//!                                           ▼
//!                                   ┌──────────────┐
//!                                   │ Orchestrator  │──▶ chat model
//!                                   │ context block │    (stream)
//!                                   └──────────────┘
//! ```
//!
//! The engine itself lives in [`fact_recall_core`]; this crate supplies
//! the pieces that touch the outside world:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool (WAL) and schema init |
//! | [`sqlite_store`] | SQLite-backed `VectorStore` implementation |
//! | [`providers`] | HTTP embedding and generation providers |
//!
//! The `recall` binary wires everything together: `recall init`,
//! `recall add`, `recall search`, `recall ask --stream`, `recall stats`,
//! `recall forget`.

pub mod config;
pub mod db;
pub mod providers;
pub mod sqlite_store;

pub use config::{load_config, Config};
pub use sqlite_store::SqliteVectorStore;
