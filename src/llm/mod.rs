//! Natural-language-to-SQL generation.
//!
//! A [`SqlGenerator`] turns a question plus a metadata snapshot into SQL
//! text. The text is not trusted: callers run it through the same
//! validation path as hand-written queries.

mod factory;
mod mock;
mod openai;
mod parser;
mod prompt;
mod types;

pub use factory::create_sql_generator;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, OpenAiConfig, OPENAI_API_URL};
pub use parser::parse_generated_sql;
pub use prompt::{build_messages, build_system_prompt};
pub use types::{Message, Role};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::db::{Dialect, MetadataSnapshot};
use crate::error::{AppError, Result};

/// Trait for chat-completion backends.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the conversation and returns the assistant's reply.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// SQL produced from a natural-language question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSql {
    pub sql: String,
    pub explanation: String,
}

/// Produces SQL text for a question about a described schema.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        snapshot: &MetadataSnapshot,
        dialect: Dialect,
    ) -> Result<GeneratedSql>;
}

/// [`SqlGenerator`] that prompts a chat-completion backend.
#[derive(Debug, Clone)]
pub struct LlmSqlGenerator<C> {
    client: C,
}

/// Generator backed by the OpenAI API.
pub type OpenAiSqlGenerator = LlmSqlGenerator<OpenAiClient>;

/// Generator backed by the deterministic pattern table.
pub type MockSqlGenerator = LlmSqlGenerator<MockLlmClient>;

impl<C: LlmClient> LlmSqlGenerator<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: LlmClient> SqlGenerator for LlmSqlGenerator<C> {
    async fn generate(
        &self,
        prompt: &str,
        snapshot: &MetadataSnapshot,
        dialect: Dialect,
    ) -> Result<GeneratedSql> {
        if prompt.trim().is_empty() {
            return Err(AppError::llm("Prompt is empty"));
        }

        let messages = build_messages(prompt, snapshot, dialect);
        let response = self.client.complete(&messages).await?;
        debug!(chars = response.len(), "Received model response");

        let generated = parse_generated_sql(&response)?;
        info!(
            connection = %snapshot.connection_name,
            dialect = %dialect,
            "Generated SQL from natural language"
        );
        Ok(generated)
    }
}

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    OpenAi,
    /// Pattern-matching mock; needs no API key.
    Mock,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(AppError::config(format!("Unknown LLM provider: {s}"))),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
