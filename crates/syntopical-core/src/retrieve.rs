//! Similarity retrieval over the indexed corpus.
//!
//! The [`Retriever`] embeds a query, asks the [`VectorStore`] for the nearest
//! chunks (optionally restricted to a [`Scope`] of document ids) and returns
//! them in [`rank_order`]:
//!
//! 1. score, descending
//! 2. `document_id`, ascending
//! 3. `start_offset`, ascending
//!
//! An empty corpus for the requested scope is reported as
//! [`Error::Retrieval`] with `empty_corpus = true`, which is distinct from a
//! store outage and from a query that simply matched nothing.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::embedding::{embed_one, Embedder};
use crate::error::{Error, Result};
use crate::models::RetrievalResult;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{Scope, VectorStore};

/// Total order used for every ranked list in the pipeline.
pub fn rank_order(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.document_id.cmp(&b.document_id))
        .then_with(|| a.start_offset.cmp(&b.start_offset))
        .then_with(|| a.chunk_index.cmp(&b.chunk_index))
}

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Return up to `k` chunks most similar to `query`.
    ///
    /// A blank query or `k == 0` yields an empty list. If fewer than `k`
    /// chunks are indexed in scope, all of them are returned.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.ensure_indexed(scope).await?;
        let vector = self.embed_query(query).await?;
        self.query_store(&vector, k, scope).await
    }

    /// Like [`retrieve`](Self::retrieve) with a precomputed query vector.
    pub async fn retrieve_by_vector(
        &self,
        vector: &[f32],
        k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.ensure_indexed(scope).await?;
        self.query_store(vector, k, scope).await
    }

    /// The single best chunk of each listed document, in [`rank_order`].
    /// Documents without chunks are skipped.
    pub async fn best_per_document(
        &self,
        vector: &[f32],
        document_ids: &[String],
    ) -> Result<Vec<RetrievalResult>> {
        let mut best = Vec::with_capacity(document_ids.len());
        for id in document_ids {
            let scope: Scope = std::iter::once(id.clone()).collect();
            let mut hits = self.query_store(vector, 1, Some(&scope)).await?;
            if let Some(top) = hits.pop() {
                best.push(top);
            }
        }
        best.sort_by(rank_order);
        Ok(best)
    }

    /// Ids of documents with indexed chunks in `scope`.
    pub async fn document_ids(&self, scope: Option<&Scope>) -> Result<Vec<String>> {
        with_retry(self.retry, "document_ids", || self.store.document_ids(scope)).await
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        with_retry(self.retry, "embed_query", || {
            embed_one(self.embedder.as_ref(), query)
        })
        .await
    }

    async fn ensure_indexed(&self, scope: Option<&Scope>) -> Result<()> {
        let count =
            with_retry(self.retry, "count_chunks", || self.store.count_chunks(scope)).await?;
        if count == 0 {
            return Err(Error::empty_corpus(scope.is_some()));
        }
        Ok(())
    }

    async fn query_store(
        &self,
        vector: &[f32],
        k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievalResult>> {
        let mut results =
            with_retry(self.retry, "query", || self.store.query(vector, k, scope)).await?;
        results.sort_by(rank_order);
        results.truncate(k);
        tracing::debug!(k, returned = results.len(), scoped = scope.is_some(), "retrieved chunks");
        Ok(results)
    }
}
