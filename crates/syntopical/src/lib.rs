//! # Syntopical
//!
//! Ask questions across a corpus of academic papers and get answers
//! synthesized from many of them at once, with the sources each answer drew
//! on.
//!
//! This crate is the application layer around [`syntopical_core`]: SQLite
//! storage, HTTP embedding and chat providers, PDF extraction, arXiv
//! search, and the `syntopical` CLI.
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ PDF / text │──▶│  extract   │──▶│ core Indexer │──▶ SQLite
//! │   arXiv    │   │  + ingest  │   │ chunk+embed  │
//! └────────────┘   └────────────┘   └──────────────┘
//!                                          │
//!                 ┌────────────────────────┘
//!                 ▼
//!          ┌─────────────┐   ┌──────────────┐
//!          │  Retriever  │──▶│   Analyst    │──▶ answer + sources
//!          │  (top-k)    │   │ assemble+LLM │
//!          └─────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `VectorStore` |
//! | [`embedding`] | OpenAI / Ollama / hashing embedders |
//! | [`llm`] | OpenAI / Ollama chat models |
//! | [`extract`] | PDF and text extraction with metadata heuristics |
//! | [`ingest`] | Upload pipeline |
//! | [`arxiv`] | arXiv search and download |
//! | [`app`] | Config → pipeline wiring |
//! | [`papers`], [`search`], [`chat`], [`start`] | CLI commands |

pub mod app;
pub mod arxiv;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod papers;
pub mod search;
pub mod sqlite_store;
pub mod start;
