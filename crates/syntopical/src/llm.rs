//! Chat-completion providers implementing [`LanguageModel`].
//!
//! - **`openai`**: `POST {url}/chat/completions`. Requires `OPENAI_API_KEY`.
//! - **`ollama`**: `POST {url}/api/chat` with `stream: false`.
//! - **`disabled`**: every call fails; retrieval-only commands still work.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use syntopical_core::assemble::AssembledContext;
use syntopical_core::error::{Error, Result as CoreResult};
use syntopical_core::llm::LanguageModel;
use syntopical_core::models::Message;

use crate::config::LlmConfig;
use crate::http::{self, Failure};

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

fn generation_error(f: Failure) -> Error {
    Error::generation(f.message, f.transient)
}

fn wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
        .collect()
}

fn missing(field: &str, service: &str) -> Error {
    Error::generation(format!("Invalid {service} response: missing {field}"), false)
}

// ============ OpenAI ============

pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config.url.clone().unwrap_or_else(|| OPENAI_URL.to_string()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], _context: &AssembledContext) -> CoreResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = http::send_json(request, "OpenAI").await.map_err(generation_error)?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> CoreResult<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| missing("choices[0].message.content", "OpenAI"))
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: config.url.clone().unwrap_or_else(|| OLLAMA_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[Message], _context: &AssembledContext) -> CoreResult<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": wire_messages(messages),
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        let request = self
            .client
            .post(format!("{}/api/chat", self.url.trim_end_matches('/')))
            .json(&body);
        let json = http::send_json(request, "Ollama").await.map_err(generation_error)?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| missing("message.content", "Ollama"))
    }
}

// ============ Disabled ============

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _: &[Message], _: &AssembledContext) -> CoreResult<String> {
        Err(Error::generation(
            "language model is disabled (set [llm] provider in the config)",
            false,
        ))
    }
}

/// Build the language model named by `config.provider`.
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledModel)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntopical_core::models::Role;

    #[test]
    fn test_parse_openai_chat() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Both papers agree."}}]
        });
        assert_eq!(parse_openai_chat(&json).unwrap(), "Both papers agree.");
        assert!(parse_openai_chat(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn test_wire_messages_use_lowercase_roles() {
        let wire = wire_messages(&[Message::system("s"), Message::user("u")]);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], Role::User.as_str());
    }

    #[tokio::test]
    async fn test_disabled_model_fails_fatally() {
        let err = DisabledModel
            .generate(&[], &AssembledContext::empty(10))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
