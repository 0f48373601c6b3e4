//! Indexing: chunk a document, embed the chunks, commit them to the store.
//!
//! Re-indexing a document id replaces its previous chunks as one unit
//! ([`VectorStore::replace_document`]), so the store never holds orphaned or
//! duplicated entries for a document after a successful index. Embedding
//! batches for one document run concurrently and are joined before the
//! commit; any failure aborts the whole attempt, and a transient failure
//! is retried once for the whole document.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::chunk::{chunk_text, ChunkParams};
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{Chunk, Document, IndexResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::VectorStore;

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    params: ChunkParams,
    batch_size: usize,
    retry: RetryPolicy,
}

/// Outcome of [`Indexer::index_all`]. One bad document does not abort the
/// batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub indexed: Vec<IndexResult>,
    /// `(document_id, error)` pairs, in input order.
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    pub fn chunks_indexed(&self) -> usize {
        self.indexed.iter().map(|r| r.chunks_indexed).sum()
    }
}

impl Indexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        params: ChunkParams,
    ) -> Self {
        let batch_size = embedder.max_batch_size().max(1);
        Self {
            store,
            embedder,
            params,
            batch_size,
            retry: RetryPolicy::default(),
        }
    }

    /// Cap the number of chunks sent per embedding call. Clamped to
    /// `1..=embedder.max_batch_size()`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, self.embedder.max_batch_size().max(1));
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn params(&self) -> &ChunkParams {
        &self.params
    }

    /// Chunk, embed and store `doc`, replacing any previous chunks for its id.
    ///
    /// # Errors
    ///
    /// - [`Error::Extraction`] if the document has no text.
    /// - [`Error::Embedding`] if embedding fails or returns the wrong number
    ///   or size of vectors.
    /// - [`Error::Store`] if the commit fails.
    pub async fn index(&self, doc: &Document) -> Result<IndexResult> {
        self.params.validate()?;
        let chunks = chunk_text(&doc.id, &doc.full_text, &self.params);
        if chunks.is_empty() {
            return Err(Error::Extraction(format!(
                "{} has no extractable text",
                doc.source_uri
            )));
        }

        with_retry(self.retry, "index_document", || self.index_once(doc, &chunks)).await?;

        tracing::info!(
            document_id = %doc.id,
            title = %doc.title,
            chunks = chunks.len(),
            "indexed document"
        );
        Ok(IndexResult {
            document_id: doc.id.clone(),
            chunks_indexed: chunks.len(),
        })
    }

    /// Index each document independently.
    pub async fn index_all(&self, docs: &[Document]) -> BatchReport {
        let mut report = BatchReport::default();
        for doc in docs {
            match self.index(doc).await {
                Ok(result) => report.indexed.push(result),
                Err(e) => {
                    tracing::warn!(document_id = %doc.id, error = %e, "skipping document");
                    report.failed.push((doc.id.clone(), e));
                }
            }
        }
        report
    }

    /// Remove a document with its chunks and vectors. Returns whether it
    /// existed.
    pub async fn remove(&self, document_id: &str) -> Result<bool> {
        with_retry(self.retry, "delete_document", || {
            self.store.delete_document(document_id)
        })
        .await
    }

    async fn index_once(&self, doc: &Document, chunks: &[Chunk]) -> Result<()> {
        let vectors = self.embed_chunks(chunks).await?;
        self.store.replace_document(doc, chunks, &vectors).await
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<Vec<String>> = chunks
            .chunks(self.batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        tracing::debug!(chunks = chunks.len(), batches = batches.len(), "embedding chunks");

        let embedded = try_join_all(batches.iter().map(|texts| self.embed_batch(texts))).await?;
        Ok(embedded.into_iter().flatten().collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::embedding(
                format!(
                    "embedder returned {} vectors for a batch of {}",
                    vectors.len(),
                    texts.len()
                ),
                true,
            ));
        }
        let dims = self.embedder.dims();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(Error::embedding(
                format!("expected {dims}-dimensional vectors, got {}", bad.len()),
                false,
            ));
        }
        Ok(vectors)
    }
}
