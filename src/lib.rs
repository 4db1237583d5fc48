//! Transaction Query Engine
//!
//! A hybrid natural-language query engine over a personal transaction
//! table. Questions are routed to deterministic aggregation tools when
//! they can be answered exactly, and to semantic retrieval over a
//! vector index otherwise; a narration layer turns either result into
//! a short answer without ever recomputing the figures.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod models;
pub mod narrator;
pub mod provider;
pub mod router;
pub mod session;
pub mod store;
pub mod tools;

pub use config::{EngineConfig, FreshnessMode};
pub use engine::QueryEngine;
pub use error::{EngineError, Result};
pub use models::{AskOutcome, QueryIntent, TransactionRecord};
pub use session::SessionHistory;
pub use store::{InMemoryTransactionStore, TransactionStore};
