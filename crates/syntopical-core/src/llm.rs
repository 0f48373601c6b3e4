//! Language model capability.
//!
//! HTTP-backed chat providers live in the app crate. Implementations map
//! failures to [`Error::Generation`](crate::error::Error::Generation) with
//! `transient` set for retryable conditions (timeouts, rate limits, 5xx).

use async_trait::async_trait;

use crate::assemble::AssembledContext;
use crate::error::Result;
use crate::models::Message;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete the conversation in `messages`.
    ///
    /// `context` is the context already rendered into the system message;
    /// it is passed for implementations that want structured access.
    async fn generate(&self, messages: &[Message], context: &AssembledContext) -> Result<String>;
}
