//! In-memory [`VectorStore`] implementation for tests and ephemeral corpora.
//!
//! State lives behind one `std::sync::RwLock`, so `replace_document` is a
//! single critical section. Vector search is brute-force cosine similarity
//! over all stored vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Chunk, Document, DocumentSummary, RetrievalResult};
use crate::retrieve::rank_order;

use super::{in_scope, Scope, VectorStore};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
struct State {
    docs: HashMap<String, Document>,
    chunks: HashMap<String, Vec<StoredChunk>>,
}

/// In-memory store; each instance is an isolated corpus.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| Error::store("in-memory store lock poisoned", false))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| Error::store("in-memory store lock poisoned", false))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(Error::store(
                format!(
                    "{} chunks but {} vectors for document {}",
                    chunks.len(),
                    vectors.len(),
                    doc.id
                ),
                false,
            ));
        }
        let stored: Vec<StoredChunk> = chunks
            .iter()
            .zip(vectors)
            .map(|(c, v)| StoredChunk {
                chunk: c.clone(),
                vector: v.clone(),
            })
            .collect();

        let mut state = self.write()?;
        state.docs.insert(doc.id.clone(), doc.clone());
        state.chunks.insert(doc.id.clone(), stored);
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut state = self.write()?;
        state.chunks.remove(document_id);
        Ok(state.docs.remove(document_id).is_some())
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(document_id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let state = self.read()?;
        let mut out: Vec<DocumentSummary> = state
            .docs
            .values()
            .map(|d| DocumentSummary {
                id: d.id.clone(),
                title: d.title.clone(),
                source_uri: d.source_uri.clone(),
                authors: d.metadata.authors.clone(),
                published: d.metadata.published.clone(),
                chunk_count: state.chunks.get(&d.id).map_or(0, Vec::len),
            })
            .collect();
        out.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn document_ids(&self, scope: Option<&Scope>) -> Result<Vec<String>> {
        let state = self.read()?;
        let mut ids: Vec<String> = state
            .chunks
            .iter()
            .filter(|(id, chunks)| !chunks.is_empty() && in_scope(scope, id))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count_chunks(&self, scope: Option<&Scope>) -> Result<usize> {
        let state = self.read()?;
        Ok(state
            .chunks
            .iter()
            .filter(|(id, _)| in_scope(scope, id))
            .map(|(_, chunks)| chunks.len())
            .sum())
    }

    async fn chunks_for(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let state = self.read()?;
        Ok(state
            .chunks
            .get(document_id)
            .map(|chunks| chunks.iter().map(|sc| sc.chunk.clone()).collect())
            .unwrap_or_default())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievalResult>> {
        let state = self.read()?;
        let mut results: Vec<RetrievalResult> = state
            .chunks
            .iter()
            .filter(|(id, _)| in_scope(scope, id))
            .flat_map(|(doc_id, chunks)| {
                let title = state
                    .docs
                    .get(doc_id)
                    .map(|d| d.title.clone())
                    .unwrap_or_default();
                chunks.iter().map(move |sc| RetrievalResult {
                    chunk_id: sc.chunk.id.clone(),
                    document_id: doc_id.clone(),
                    document_title: title.clone(),
                    chunk_index: sc.chunk.chunk_index,
                    start_offset: sc.chunk.start_offset,
                    end_offset: sc.chunk.end_offset,
                    score: cosine_similarity(vector, &sc.vector) as f64,
                    text: sc.chunk.text.clone(),
                })
            })
            .collect();
        results.sort_by(rank_order);
        results.truncate(k);
        Ok(results)
    }
}
