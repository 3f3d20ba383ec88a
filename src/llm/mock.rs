//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::llm::{LlmClient, Message, Role};

const FALLBACK_RESPONSE: &str = "I don't understand that question. Could you please rephrase it?";

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Every conversation it receives is recorded for inspection.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    custom_responses: Vec<(String, String)>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the question contains `pattern` (case-insensitive), the mock
    /// answers with `response` verbatim. Custom mappings win over defaults.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into().to_lowercase(), response.into()));
        self
    }

    /// Conversations received so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn mock_response(&self, input: &str) -> String {
        let input_lower = input.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if input_lower.contains(pattern.as_str()) {
                return response.clone();
            }
        }

        if input_lower.contains("all users") || input_lower.contains("show users") {
            return answer("SELECT * FROM users", "Lists every user.");
        }

        if input_lower.contains("count") && input_lower.contains("orders") {
            return answer("SELECT COUNT(*) AS order_count FROM orders", "Counts all orders.");
        }

        if input_lower.contains("count") && input_lower.contains("users") {
            return answer("SELECT COUNT(*) AS user_count FROM users", "Counts all users.");
        }

        if input_lower.contains("orders") && input_lower.contains("user") {
            return answer(
                "SELECT o.* FROM orders o\nJOIN users u ON o.user_id = u.id",
                "Lists orders together with their users.",
            );
        }

        if input_lower.contains("delete") && input_lower.contains("user") {
            return answer("DELETE FROM users WHERE id = 1", "Deletes the first user.");
        }

        FALLBACK_RESPONSE.to_string()
    }

    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

fn answer(sql: &str, explanation: &str) -> String {
    format!("SQL: {sql}\nExplanation: {explanation}")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        let input = Self::extract_user_input(messages);
        Ok(self.mock_response(&input))
    }
}
