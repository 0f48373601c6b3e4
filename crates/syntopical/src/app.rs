//! Wiring from configuration to the core pipeline.
//!
//! [`App::open`] connects to the database (running migrations if needed)
//! and builds the configured embedder. The language model is only built by
//! [`App::analyst`], so retrieval-only commands work without an LLM key.

use std::sync::Arc;

use anyhow::{bail, Result};

use syntopical_core::analysis::Analyst;
use syntopical_core::embedding::Embedder;
use syntopical_core::index::Indexer;
use syntopical_core::retrieve::Retriever;
use syntopical_core::store::{Scope, VectorStore};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_language_model;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// Printed whenever a command needs indexed papers and there are none.
pub const EMPTY_CORPUS_HINT: &str = "No papers indexed yet. Run `syntopical upload <paths>` to add some.";
/// Printed when the selected papers have no indexed text.
pub const EMPTY_SCOPE_HINT: &str = "The selected papers have no indexed text.";

pub struct App {
    config: Config,
    store: Arc<SqliteStore>,
    embedder: Arc<dyn Embedder>,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self {
            config: config.clone(),
            store: Arc::new(SqliteStore::new(pool)),
            embedder,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn indexer(&self) -> Indexer {
        Indexer::new(self.store(), self.embedder.clone(), self.config.chunk_params())
            .with_batch_size(self.config.embedding.batch_size)
            .with_retry_policy(self.config.retry_policy())
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.store(), self.embedder.clone())
            .with_retry_policy(self.config.retry_policy())
    }

    pub fn analyst(&self) -> Result<Analyst> {
        let llm = create_language_model(&self.config.llm)?;
        Ok(Analyst::new(
            self.retriever(),
            llm,
            self.config.analysis_config(),
        ))
    }

    /// Turn `--paper` ids into a retrieval scope. No ids means the whole
    /// corpus; an id that is not in the store is an error.
    pub async fn resolve_scope(&self, ids: &[String]) -> Result<Option<Scope>> {
        if ids.is_empty() {
            return Ok(None);
        }
        for id in ids {
            if self.store.get_document(id).await?.is_none() {
                bail!("Unknown paper id: {} (see `syntopical list`)", id);
            }
        }
        Ok(Some(ids.iter().cloned().collect()))
    }

    pub async fn close(self) {
        self.store.pool().close().await;
    }
}

/// User-facing text for an empty corpus, or `None` if `err` is something else.
pub fn empty_corpus_message(err: &syntopical_core::Error, scoped: bool) -> Option<&'static str> {
    if !err.is_empty_corpus() {
        return None;
    }
    Some(if scoped {
        EMPTY_SCOPE_HINT
    } else {
        EMPTY_CORPUS_HINT
    })
}
