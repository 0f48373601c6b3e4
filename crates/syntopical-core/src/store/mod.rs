//! Storage abstraction for indexed papers.
//!
//! The [`VectorStore`] trait defines every storage operation the indexing
//! and retrieval pipeline needs, enabling pluggable backends (SQLite in the
//! app crate, [`memory::InMemoryStore`] here).
//!
//! A store handle is created at startup and passed to each component
//! explicitly; several independent corpora can live in one process.
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, Document, DocumentSummary, RetrievalResult};

/// A set of document ids restricting a query.
pub type Scope = BTreeSet<String>;

/// Abstract vector store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`replace_document`](VectorStore::replace_document) | Atomically insert or replace a document and all its chunks |
/// | [`delete_document`](VectorStore::delete_document) | Remove a document and cascade to its chunks |
/// | [`get_document`](VectorStore::get_document) | Fetch a document by id |
/// | [`list_documents`](VectorStore::list_documents) | List indexed documents with chunk counts |
/// | [`document_ids`](VectorStore::document_ids) | Ids of documents with at least one chunk |
/// | [`count_chunks`](VectorStore::count_chunks) | Number of indexed chunks |
/// | [`chunks_for`](VectorStore::chunks_for) | All chunks of one document, in order |
/// | [`query`](VectorStore::query) | Cosine nearest neighbours |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or update `doc` and replace all of its chunks.
    ///
    /// Existing chunks and vectors for `doc.id` are deleted before the new
    /// ones are inserted, as one unit: after success the store holds exactly
    /// `chunks` for this document; after failure it holds the previous state.
    /// `vectors[i]` is the embedding of `chunks[i]`.
    async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Delete a document with its chunks and vectors. Returns `false` if it
    /// did not exist.
    async fn delete_document(&self, document_id: &str) -> Result<bool>;

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>>;

    /// List documents, ordered by title then id.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// Ids (ascending) of documents with indexed chunks, limited to `scope`.
    async fn document_ids(&self, scope: Option<&Scope>) -> Result<Vec<String>>;

    /// Number of indexed chunks, limited to `scope`.
    async fn count_chunks(&self, scope: Option<&Scope>) -> Result<usize>;

    async fn chunks_for(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Return the `k` chunks most similar to `vector`, limited to `scope`,
    /// ordered by [`rank_order`](crate::retrieve::rank_order).
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievalResult>>;
}

pub(crate) fn in_scope(scope: Option<&Scope>, document_id: &str) -> bool {
    scope.is_none_or(|s| s.contains(document_id))
}
