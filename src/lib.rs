//! # Financial Query Engine
//!
//! Resolves free-text financial questions ("What is the revenue for 2024-25?")
//! into a structured intent and synthesizes a query against tabular data whose
//! schema is only known at load time.
//!
//! ## Core Concepts
//!
//! - **Knowledge Base**: entity to statement-file mapping, training keywords and
//!   synonym groups, loaded once and swapped atomically on reload
//! - **Intent**: action, metric entity, fiscal years, filters and a confidence score
//! - **Conversational short-circuit**: greetings, goodbyes, help and status
//!   questions never reach the data store
//! - **Schema Catalog**: table names and normalized, spreadsheet-derived column
//!   names discovered from a [`DataStore`]
//! - **Synthesis**: table selection, item and year column discovery, single-period
//!   and two-period comparison queries
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_query_engine::*;
//!
//! let mut store = MemoryStore::new();
//! store.load_csv(
//!     "Income Statement",
//!     "Item,2024-25 Budget $'000\nOwn-source revenue,200\n".as_bytes(),
//! )?;
//!
//! let engine = QueryEngine::default();
//! match engine.answer("What is the revenue for 2024-25?", &store)? {
//!     Answer::Data { sql, result, .. } => println!("{} -> {} rows", sql, result.len()),
//!     Answer::Conversation { reply, .. } => println!("{}", reply),
//! }
//! ```

pub mod confidence;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod ingestion;
pub mod knowledge;
pub mod query;
pub mod schema;
pub mod store;
pub mod synthesizer;
pub mod utils;

pub use confidence::ConfidenceScorer;
pub use config::*;
pub use engine::{rewrite_follow_up, validate_question, Answer, QueryEngine};
pub use error::{FinancialQueryError, Guidance, Result};
pub use extractor::{extract_action, EntitySource, ExtractedIntent, IntentExtractor};
pub use knowledge::{FileMappingEntry, KnowledgeBase, KnowledgeHandle, RowMappingEntry};
pub use query::{Predicate, Projection, QuerySpec};
pub use schema::*;
pub use store::{
    normalize_identifier, normalize_table_name, CellValue, DataStore, MemoryStore, QueryResult,
    SchemaCatalog, TableSchema,
};
pub use synthesizer::QuerySynthesizer;

/// Resolves one question with the built-in knowledge base and default configuration.
pub fn resolve_query(text: &str) -> QueryIntent {
    QueryEngine::default().resolve(text)
}

/// Answers one question against `store` with the built-in knowledge base.
pub fn answer_question(text: &str, store: &dyn DataStore) -> Result<Answer> {
    QueryEngine::default().answer(text, store)
}
