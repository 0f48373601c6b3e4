//! Error taxonomy for the indexing and analysis pipeline.
//!
//! Each collaborator failure maps to one variant so callers can tell a bad
//! input document from a service outage, and an empty corpus from a store
//! that could not be reached.

use thiserror::Error;

use crate::session::SessionState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The document could not be read or yielded no text.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The embedding service failed or returned malformed vectors.
    #[error("embedding error: {message}")]
    Embedding { message: String, transient: bool },

    /// The vector store failed.
    #[error("store error: {message}")]
    Store { message: String, transient: bool },

    /// Retrieval could not run. `empty_corpus` marks a scope with no
    /// indexed chunks, which callers handle separately from failures.
    #[error("retrieval error: {message}")]
    Retrieval { empty_corpus: bool, message: String },

    /// No retrieved chunk fits within the token budget.
    #[error("context budget of {budget} tokens is smaller than the smallest chunk ({smallest_chunk_tokens} tokens)")]
    BudgetExceeded {
        budget: usize,
        smallest_chunk_tokens: usize,
    },

    /// The language model call failed.
    #[error("generation error: {message}")]
    Generation { message: String, transient: bool },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("session is closed")]
    SessionClosed,

    #[error("session is busy ({0:?})")]
    SessionBusy(SessionState),
}

impl Error {
    pub fn embedding(message: impl Into<String>, transient: bool) -> Self {
        Error::Embedding {
            message: message.into(),
            transient,
        }
    }

    pub fn store(message: impl Into<String>, transient: bool) -> Self {
        Error::Store {
            message: message.into(),
            transient,
        }
    }

    pub fn generation(message: impl Into<String>, transient: bool) -> Self {
        Error::Generation {
            message: message.into(),
            transient,
        }
    }

    pub fn empty_corpus(scoped: bool) -> Self {
        let message = if scoped {
            "no indexed chunks in the selected papers".to_string()
        } else {
            "no papers have been indexed".to_string()
        };
        Error::Retrieval {
            empty_corpus: true,
            message,
        }
    }

    /// Whether a bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Embedding { transient, .. }
            | Error::Store { transient, .. }
            | Error::Generation { transient, .. } => *transient,
            _ => false,
        }
    }

    pub fn is_empty_corpus(&self) -> bool {
        matches!(
            self,
            Error::Retrieval {
                empty_corpus: true,
                ..
            }
        )
    }
}
