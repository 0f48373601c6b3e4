//! Core data models used throughout Syntopical.
//!
//! These types represent the papers, chunks, retrieval results, and
//! conversation messages that flow through the indexing and analysis
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bibliographic metadata for a paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub authors: Vec<String>,
    /// Publication date as `YYYY-MM-DD` (or whatever precision the source had).
    pub published: Option<String>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub keywords: Vec<String>,
    /// Source-specific fields (e.g. arXiv categories).
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// A paper whose text has been extracted and that can be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Path or URI the paper was loaded from.
    pub source_uri: String,
    pub full_text: String,
    pub metadata: PaperMetadata,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// Build a document whose id is derived from `source_uri`.
    ///
    /// Loading the same source twice yields the same id, which is what makes
    /// re-uploading a paper replace its previous chunks instead of adding a
    /// second copy.
    pub fn new(
        title: impl Into<String>,
        source_uri: impl Into<String>,
        full_text: impl Into<String>,
        metadata: PaperMetadata,
    ) -> Self {
        let source_uri = source_uri.into();
        Self {
            id: document_id_for(&source_uri),
            title: title.into(),
            source_uri,
            full_text: full_text.into(),
            metadata,
            ingested_at: Utc::now(),
        }
    }
}

/// Deterministic document id (UUID v5 over the source URI).
pub fn document_id_for(source_uri: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, source_uri.as_bytes()).to_string()
}

/// Lightweight listing row for an indexed paper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub source_uri: String,
    pub authors: Vec<String>,
    pub published: Option<String>,
    pub chunk_count: usize,
}

/// A contiguous slice of a document's text, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{document_id}:{chunk_index:05}"`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// Byte offset of the first byte in the document text.
    pub start_offset: usize,
    /// Byte offset one past the last byte.
    pub end_offset: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// Chunk id for a document and sequence index.
pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}:{:05}", document_id, chunk_index)
}

/// A chunk matched by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub document_title: String,
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Cosine similarity to the query vector.
    pub score: f64,
    pub text: String,
}

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexResult {
    pub document_id: String,
    pub chunks_indexed: usize,
}

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
