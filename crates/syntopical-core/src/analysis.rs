//! Chat and syntopical analysis over a session.
//!
//! Each turn runs one retrieval, one context assembly and one language
//! model call, moving the [`AnalysisSession`] through its states. The
//! answer cites exactly the documents present in the assembled context.
//!
//! # Coverage backfill
//!
//! [`Analyst::analyze`] takes the top-k chunks by score; if they come from
//! fewer than `min_documents` distinct documents, the best chunk of every
//! other in-scope document is added before assembly, and assembly admits
//! one chunk per document first. A topic is then answered from several
//! papers even when one paper dominates the raw ranking.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::assemble::{assemble, AssembledContext, AssemblyOptions, SourceRef};
use crate::error::{Error, Result};
use crate::llm::LanguageModel;
use crate::models::{Message, RetrievalResult};
use crate::prompt;
use crate::retrieve::Retriever;
use crate::session::{AnalysisSession, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Chunks retrieved by score per turn.
    pub top_k: usize,
    pub token_budget: usize,
    /// Distinct documents an analysis should draw on before backfilling.
    pub min_documents: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            token_budget: 3000,
            min_documents: 3,
        }
    }
}

/// An attributed answer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Documents whose passages were in the context, in passage order.
    pub sources: Vec<SourceRef>,
    pub context: AssembledContext,
    pub context_tokens: usize,
    /// Distinct documents among the retrieved candidates.
    pub documents_retrieved: usize,
}

pub struct Analyst {
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
    config: AnalysisConfig,
}

impl Analyst {
    pub fn new(retriever: Retriever, llm: Arc<dyn LanguageModel>, config: AnalysisConfig) -> Self {
        Self {
            retriever,
            llm,
            config,
        }
    }

    /// Answer one question. History is sent to the model but not used for
    /// retrieval.
    pub async fn chat(&self, session: &mut AnalysisSession, question: &str) -> Result<Answer> {
        session.begin_turn()?;
        match self.chat_turn(session, question).await {
            Ok(answer) => {
                session.complete_turn(question, &answer.text);
                Ok(answer)
            }
            Err(e) => {
                session.abort_turn();
                Err(e)
            }
        }
    }

    /// Run a structured syntopical analysis of `topic` across the session
    /// scope (or the whole corpus).
    pub async fn analyze(&self, session: &mut AnalysisSession, topic: &str) -> Result<Answer> {
        session.begin_turn()?;
        let request = prompt::analysis_prompt(topic);
        match self.analyze_turn(session, topic, &request).await {
            Ok(answer) => {
                session.complete_turn(&request, &answer.text);
                Ok(answer)
            }
            Err(e) => {
                session.abort_turn();
                Err(e)
            }
        }
    }

    async fn chat_turn(&self, session: &mut AnalysisSession, question: &str) -> Result<Answer> {
        require_text(question, "question")?;

        session.advance(SessionState::Retrieving);
        let results = self
            .retriever
            .retrieve(question, self.config.top_k, session.scope())
            .await?;

        session.advance(SessionState::Assembling);
        let context = assemble(&results, &self.options(false))?;

        session.advance(SessionState::Generating);
        self.generate(session, prompt::enhance_query(question), &results, context)
            .await
    }

    async fn analyze_turn(
        &self,
        session: &mut AnalysisSession,
        topic: &str,
        request: &str,
    ) -> Result<Answer> {
        require_text(topic, "topic")?;

        session.advance(SessionState::Retrieving);
        let in_scope = self.retriever.document_ids(session.scope()).await?;
        if in_scope.is_empty() {
            return Err(Error::empty_corpus(session.scope().is_some()));
        }
        let vector = self.retriever.embed_query(topic).await?;
        let mut results = self
            .retriever
            .retrieve_by_vector(&vector, self.config.top_k, session.scope())
            .await?;

        let represented: BTreeSet<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        if represented.len() < self.config.min_documents {
            let remaining: Vec<String> = in_scope
                .iter()
                .filter(|id| !represented.contains(id.as_str()))
                .cloned()
                .collect();
            let backfill = self.retriever.best_per_document(&vector, &remaining).await?;
            tracing::debug!(
                represented = represented.len(),
                min_documents = self.config.min_documents,
                backfilled = backfill.len(),
                "coverage backfill"
            );
            results.extend(backfill);
        }

        session.advance(SessionState::Assembling);
        let context = assemble(&results, &self.options(true))?;

        session.advance(SessionState::Generating);
        self.generate(session, request.to_string(), &results, context)
            .await
    }

    async fn generate(
        &self,
        session: &AnalysisSession,
        user_message: String,
        results: &[RetrievalResult],
        context: AssembledContext,
    ) -> Result<Answer> {
        let mut messages = Vec::with_capacity(session.history().len() + 2);
        messages.push(Message::system(prompt::system_prompt(&context)));
        messages.extend(session.history().iter().cloned());
        messages.push(Message::user(user_message));

        let text = self.llm.generate(&messages, &context).await?;

        let documents_retrieved = results
            .iter()
            .map(|r| r.document_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        Ok(Answer {
            text,
            sources: context.sources(),
            context_tokens: context.total_tokens,
            context,
            documents_retrieved,
        })
    }

    fn options(&self, cover_documents: bool) -> AssemblyOptions {
        AssemblyOptions {
            token_budget: self.config.token_budget,
            cover_documents,
        }
    }
}

fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}
