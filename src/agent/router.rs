//! Router: picks the next worker, or ends the turn.
//!
//! The decision is delegated to the language capability as an enum-constrained
//! choice. Anything outside the option set is a protocol error; it is never
//! mapped onto a default worker.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::context::CycleContext;
use crate::error::{LlmError, RouteError};
use crate::llm::{ChatMessage, ChoiceRequest, LlmProvider};
use crate::memory::Turn;
use crate::worker::{WorkerKind, history_messages};

/// Sentinel the capability answers with when the turn is done.
pub const TERMINATE: &str = "FINISH";

/// Where control goes after a routing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Worker(WorkerKind),
    Terminate,
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker(kind) => write!(f, "{kind}"),
            Self::Terminate => f.write_str(TERMINATE),
        }
    }
}

/// Enum-constrained router over a fixed set of workers.
pub struct Router {
    llm: Arc<dyn LlmProvider>,
    workers: Vec<WorkerKind>,
    timeout: Duration,
}

impl Router {
    pub fn new(llm: Arc<dyn LlmProvider>, workers: impl IntoIterator<Item = WorkerKind>) -> Self {
        let mut workers: Vec<_> = workers.into_iter().collect();
        workers.sort();
        workers.dedup();
        Self {
            llm,
            workers,
            timeout: Duration::from_secs(60),
        }
    }

    /// Per-call timeout for the routing capability.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(&self) -> &[WorkerKind] {
        &self.workers
    }

    /// Allowed answers: every worker name plus the terminate sentinel.
    pub fn options(&self) -> Vec<String> {
        self.workers
            .iter()
            .map(|w| w.as_str().to_string())
            .chain(std::iter::once(TERMINATE.to_string()))
            .collect()
    }

    /// Decide the next step from the session's turns.
    pub async fn decide(
        &self,
        turns: &[Turn],
        ctx: &CycleContext,
    ) -> Result<RouteDecision, RouteError> {
        let options = self.options();
        let mut messages = Vec::with_capacity(turns.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt(&options)));
        messages.extend(history_messages(turns));
        messages.push(ChatMessage::system(format!(
            "Given the conversation above, who should act next? Or should we {TERMINATE}? \
             Select one of: {}",
            options.join(", ")
        )));

        let response = tokio::time::timeout_at(
            ctx.call_deadline(self.timeout),
            self.llm.complete_choice(ChoiceRequest { messages, options }),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.timeout))??;

        let decision = self.validate(&response.choice)?;
        tracing::debug!(
            session_id = %ctx.session_id,
            cycle = ctx.cycle,
            decision = %decision,
            "Route decided"
        );
        Ok(decision)
    }

    /// Exact match against the option set.
    fn validate(&self, raw: &str) -> Result<RouteDecision, RouteError> {
        if raw == TERMINATE {
            return Ok(RouteDecision::Terminate);
        }
        match raw.parse::<WorkerKind>() {
            Ok(kind) if self.workers.contains(&kind) => Ok(RouteDecision::Worker(kind)),
            _ => Err(RouteError::InvalidDecision {
                value: raw.to_string(),
            }),
        }
    }

    fn system_prompt(&self, options: &[String]) -> String {
        let members: Vec<&str> = self.workers.iter().map(|w| w.as_str()).collect();
        let hints: String = self
            .workers
            .iter()
            .map(|w| format!("- {}: {}\n", w.as_str(), w.routing_hint()))
            .collect();
        format!(
            "You are a supervisor tasked with managing a conversation between the following \
             workers: {members}.\n\
             Given the following user request, respond with the worker to act next. \
             Each worker will perform a task and respond with their results and status. \
             When finished, respond with {TERMINATE}.\n\n\
             {hints}\n\
             Respond with one of the following options: {options}. \
             If the latest worker reply already answers the user, respond with {TERMINATE}.",
            members = members.join(", "),
            options = options.join(", "),
        )
    }
}
