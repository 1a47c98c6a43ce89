//! Reasoning layer: wraps an LLM provider with a system prompt and tool calling.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{
    ChatMessage, CompletionRequest, LlmProvider, ToolCall, ToolCompletionRequest, ToolDefinition,
};

/// Context for a reasoning operation.
#[derive(Debug, Clone, Default)]
pub struct ReasoningContext {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

impl ReasoningContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token usage from an LLM call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// What a worker's capability produced for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// Terminal reply for the cycle.
    FinalReply(String),
    /// The capability wants to invoke one or more registered tools.
    ToolRequest {
        calls: Vec<ToolCall>,
        /// Text the model emitted alongside the calls, if any.
        content: Option<String>,
    },
}

/// Output from a `respond` call.
#[derive(Debug, Clone)]
pub struct RespondOutput {
    pub outcome: WorkerOutcome,
    pub usage: TokenUsage,
}

/// Reasoning layer that wraps an LLM provider.
pub struct Reasoning {
    llm: Arc<dyn LlmProvider>,
    system_prompt: Option<String>,
}

impl Reasoning {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Call the LLM, returning either a final reply or a tool request.
    pub async fn respond(&self, context: &ReasoningContext) -> Result<RespondOutput, LlmError> {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);
        if let Some(ref prompt) = self.system_prompt {
            messages.push(ChatMessage::system(prompt));
        }
        messages.extend(context.messages.iter().cloned());

        // No tools: plain completion
        if context.tools.is_empty() {
            let response = self.llm.complete(CompletionRequest::new(messages)).await?;
            return Ok(RespondOutput {
                outcome: WorkerOutcome::FinalReply(response.content),
                usage: TokenUsage {
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                },
            });
        }

        let request = ToolCompletionRequest::new(messages, context.tools.clone());
        let response = self.llm.complete_with_tools(request).await?;

        let usage = TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        };

        let outcome = if response.tool_calls.is_empty() {
            WorkerOutcome::FinalReply(response.content.unwrap_or_default())
        } else {
            WorkerOutcome::ToolRequest {
                calls: response.tool_calls,
                content: response.content,
            }
        };

        Ok(RespondOutput { outcome, usage })
    }
}
