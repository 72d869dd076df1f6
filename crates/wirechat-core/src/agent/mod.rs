//! Agent loop: drives one conversational turn to completion.
//!
//! The loop:
//! 1. Sends the conversation and the tool specifications to the provider
//! 2. If the model requests tools, records the request, runs every tool in
//!    order and appends the results
//! 3. Repeats until the model answers without tool calls

pub mod memory;

use tracing::{debug, info, warn};

use crate::error::{Result, ToolError};
use crate::provider::types::{ChatResponse, MessageRound};
use crate::provider::LlmProvider;
use crate::tools::ToolManager;
pub use memory::Conversation;

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model requests allowed in one turn before giving up.
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_iterations: 20 }
    }
}

/// Owns the provider and the tools for one session.
pub struct AgentLoop {
    provider: Box<dyn LlmProvider>,
    tools: ToolManager,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(provider: Box<dyn LlmProvider>, tools: ToolManager, config: AgentConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &ToolManager {
        &self.tools
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    /// Add `prompt` as a user round and run the turn.
    ///
    /// A failed turn leaves `conversation` exactly as it was before the call,
    /// prompt included.
    pub async fn ask(&self, conversation: &mut Conversation, prompt: &str) -> Result<ChatResponse> {
        let checkpoint = conversation.clone();
        conversation.push(MessageRound::user(prompt));
        let result = self.run_turn(conversation).await;
        restore_on_error(conversation, checkpoint, result)
    }

    /// Run the turn on the conversation as it stands.
    ///
    /// Every model round and tool result is appended to `conversation`,
    /// including the final answer, which is also returned. On error the
    /// rounds added by this call are discarded, so the turn can be retried.
    pub async fn process(&self, conversation: &mut Conversation) -> Result<ChatResponse> {
        let checkpoint = conversation.clone();
        let result = self.run_turn(conversation).await;
        restore_on_error(conversation, checkpoint, result)
    }

    async fn run_turn(&self, conversation: &mut Conversation) -> Result<ChatResponse> {
        let specs = self.tools.specifications();
        let mut iterations = 0u32;

        loop {
            iterations += 1;
            if iterations > self.config.max_iterations {
                warn!(
                    iterations = self.config.max_iterations,
                    "Hit max tool iterations, forcing stop"
                );
                return Err(ToolError::TooManyRounds(self.config.max_iterations).into());
            }

            debug!(
                iteration = iterations,
                msg_count = conversation.len(),
                model = self.provider.model_name(),
                "Calling LLM"
            );
            let response = self.provider.chat(conversation.rounds(), specs).await?;
            conversation.push(response.message.clone());

            if response.tool_calls().is_empty() {
                info!(
                    input_tokens = response.usage.input,
                    output_tokens = response.usage.output,
                    finish_reason = ?response.finish_reason,
                    iterations,
                    "Response complete"
                );
                return Ok(response);
            }

            debug!(calls = response.tool_calls().len(), "Model requested tools");
            let results = self.tools.execute_all(response.tool_calls()).await?;
            conversation.extend(results);
        }
    }
}

/// Put `checkpoint` back when the turn failed. A MODEL round whose tool
/// calls were never answered must not reach the next request.
fn restore_on_error(
    conversation: &mut Conversation,
    checkpoint: Conversation,
    result: Result<ChatResponse>,
) -> Result<ChatResponse> {
    if let Err(e) = &result {
        warn!(
            error = %e,
            discarded = conversation.len().saturating_sub(checkpoint.len()),
            "Turn failed, restoring conversation"
        );
        *conversation = checkpoint;
    }
    result
}
