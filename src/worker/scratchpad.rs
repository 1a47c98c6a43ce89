//! Per-cycle tool traffic.
//!
//! A scratchpad lives for exactly one router→worker cycle. It is handed to
//! the worker by value, grows as tools run, and is dropped when the cycle
//! ends; nothing in it is written to session memory.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::llm::{ChatMessage, ToolCall};

/// Outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// Text handed back to the model.
    pub output: String,
    pub success: bool,
    pub duration: Duration,
    pub executed_at: DateTime<Utc>,
}

impl ToolResult {
    pub fn succeeded(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            output: output.into(),
            success: true,
            duration,
            executed_at: Utc::now(),
        }
    }

    /// Failures are rendered as `Error: ...` so the model can react to them.
    pub fn failed(error: impl std::fmt::Display, duration: Duration) -> Self {
        Self {
            output: format!("Error: {error}"),
            success: false,
            duration,
            executed_at: Utc::now(),
        }
    }
}

/// One model round that requested tools, with the results collected so far.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRound {
    /// Text the model emitted alongside its calls.
    pub content: Option<String>,
    pub calls: Vec<ToolCall>,
    /// Parallel to `calls`; shorter while the round is still running.
    pub results: Vec<ToolResult>,
}

/// Ordered tool-call/tool-result pairs for a single cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScratchPad {
    rounds: Vec<ToolRound>,
}

impl ScratchPad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new round for a batch of calls.
    pub fn begin_round(&mut self, content: Option<String>, calls: Vec<ToolCall>) {
        self.rounds.push(ToolRound {
            content,
            calls,
            results: Vec::new(),
        });
    }

    /// Record the result for the next pending call in the current round.
    pub fn record(&mut self, result: ToolResult) {
        if let Some(round) = self.rounds.last_mut()
            && round.results.len() < round.calls.len()
        {
            round.results.push(result);
        }
    }

    pub fn rounds(&self) -> &[ToolRound] {
        &self.rounds
    }

    /// Number of tool invocations recorded.
    pub fn invocation_count(&self) -> usize {
        self.rounds.iter().map(|r| r.results.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Render as model messages: each round becomes one assistant message
    /// carrying its calls, followed by one tool message per answered call.
    /// Unanswered calls are dropped so every emitted call has a result.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        for round in &self.rounds {
            let answered: Vec<ToolCall> = round
                .calls
                .iter()
                .take(round.results.len())
                .cloned()
                .collect();
            if answered.is_empty() {
                continue;
            }
            messages.push(ChatMessage::assistant_with_tool_calls(
                round.content.clone(),
                answered.clone(),
            ));
            for (call, result) in answered.iter().zip(&round.results) {
                messages.push(ChatMessage::tool_result(
                    &call.id,
                    &call.name,
                    &result.output,
                ));
            }
        }
        messages
    }
}
