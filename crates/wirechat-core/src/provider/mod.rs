//! LLM provider trait and the configurable adapter.
//!
//! Defines the `LlmProvider` trait the agent loop talks to. The `custom`
//! module implements it for any JSON-over-HTTP backend described by
//! configuration, using `payload` to render requests and `json_path` to read
//! responses.

pub mod custom;
pub mod json_path;
pub mod payload;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::{ChatResponse, MessageRound, ToolSpecification};

/// Trait for LLM providers.
///
/// One call is one request/response cycle. Implementations must not retry.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send the conversation and the available tools, return the model's reply.
    ///
    /// # Arguments
    /// * `messages` - Conversation history, oldest first
    /// * `tools` - Tools the model may call (empty = no tool calling)
    async fn chat(
        &self,
        messages: &[MessageRound],
        tools: &[ToolSpecification],
    ) -> Result<ChatResponse>;

    /// Model identifier sent to the backend.
    fn model_name(&self) -> &str;
}
