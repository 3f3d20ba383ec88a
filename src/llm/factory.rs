//! SQL generator factory.
//!
//! Centralizes provider-specific logic for creating generators from the
//! `[llm]` configuration section.

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::Result;
use crate::llm::{
    LlmProvider, LlmSqlGenerator, MockLlmClient, OpenAiClient, OpenAiConfig, SqlGenerator,
};

/// Creates the SQL generator selected by `config.provider`.
///
/// The OpenAI provider needs an API key, taken from `config.api_key`
/// (normally filled from `OPENAI_API_KEY`).
pub fn create_sql_generator(config: &LlmConfig) -> Result<Arc<dyn SqlGenerator>> {
    match config.provider.parse::<LlmProvider>()? {
        LlmProvider::OpenAi => {
            let client = OpenAiClient::new(OpenAiConfig::from_llm_config(config)?)?;
            Ok(Arc::new(LlmSqlGenerator::new(client)))
        }
        LlmProvider::Mock => Ok(Arc::new(LlmSqlGenerator::new(MockLlmClient::new()))),
    }
}
