//! # Syntopical Core
//!
//! The retrieval-augmented analysis pipeline behind Syntopical: chunking,
//! indexing, similarity retrieval, context assembly under a token budget,
//! and attributed chat and topic analysis.
//!
//! External services are capability traits ([`embedding::Embedder`],
//! [`store::VectorStore`], [`llm::LanguageModel`]) with deterministic
//! implementations here ([`embedding::HashingEmbedder`],
//! [`store::memory::InMemoryStore`]). This crate contains no tokio, sqlx,
//! filesystem or network code.
//!
//! ```text
//! Document ─▶ chunk ─▶ index ─▶ VectorStore
//! query ─▶ retrieve ─▶ assemble ─▶ analysis ─▶ Answer { text, sources }
//! ```

pub mod analysis;
pub mod assemble;
pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod retry;
pub mod session;
pub mod store;

pub use error::{Error, Result};
