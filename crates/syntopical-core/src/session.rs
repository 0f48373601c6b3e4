//! Conversation sessions over a corpus scope.
//!
//! A session moves through
//! `Idle → AwaitingQuery → Retrieving → Assembling → Generating → Idle`
//! once per turn, and ends in `Closed`. The [`Analyst`](crate::analysis::Analyst)
//! drives the transitions; a turn can only start from `Idle`.

use crate::error::{Error, Result};
use crate::models::Message;
use crate::store::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingQuery,
    Retrieving,
    Assembling,
    Generating,
    Closed,
}

/// Transient per-conversation state.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    scope: Option<Scope>,
    history: Vec<Message>,
    state: SessionState,
}

impl AnalysisSession {
    /// Start a session over the whole corpus (`None`) or a set of documents.
    pub fn new(scope: Option<Scope>) -> Self {
        Self {
            scope,
            history: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Prior turns, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Clear the conversation history. The scope is kept.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.history.clear();
        Ok(())
    }

    /// End the session. Closing is allowed from any state, including an
    /// abandoned `Generating` turn.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Closed => Err(Error::SessionClosed),
            other => Err(Error::SessionBusy(other)),
        }
    }

    pub(crate) fn begin_turn(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.state = SessionState::AwaitingQuery;
        Ok(())
    }

    pub(crate) fn advance(&mut self, next: SessionState) {
        if self.state != SessionState::Closed {
            self.state = next;
        }
    }

    /// Finish a turn successfully, recording the exchange.
    pub(crate) fn complete_turn(&mut self, question: &str, answer: &str) {
        if self.state == SessionState::Closed {
            return;
        }
        self.history.push(Message::user(question));
        self.history.push(Message::assistant(answer));
        self.state = SessionState::Idle;
    }

    /// Finish a failed turn; history is left untouched.
    pub(crate) fn abort_turn(&mut self) {
        self.advance(SessionState::Idle);
    }
}
