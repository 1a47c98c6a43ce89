//! Orchestration engine: the per-turn state machine.
//!
//! ```text
//! AwaitInput → GatingInput → Routing → ExecutingWorker → GatingOutput ─┐
//!                  │            │  ▲           │               │        │
//!                  └────────────┴──┼───────────┴───────────────┴─→ Terminated
//!                                  └───────────────────────────────────┘
//! ```
//!
//! Every path ends in `Terminated` with a natural-language reply recorded in
//! memory exactly once per completed step.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::agent::router::{RouteDecision, Router};
use crate::config::EngineConfig;
use crate::context::CycleContext;
use crate::error::{RouteError, WorkerError};
use crate::guardrail::GuardrailGate;
use crate::memory::{MemoryStore, NewTurn, SessionInfo, Turn};
use crate::worker::{ScratchPad, WorkerAdapter, WorkerKind};

/// Reply when the turn ends without any worker reply.
pub const DEFAULT_COMPLETION_REPLY: &str = "대화가 완료되었습니다.";

/// Reply for routing protocol errors and capability failures.
pub const GENERIC_FAILURE_REPLY: &str =
    "죄송합니다. 요청을 처리하는 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";

/// Reply when a worker asked for a tool it does not have.
pub const UNKNOWN_TOOL_REPLY: &str =
    "죄송합니다. 요청을 처리할 수 있는 도구를 찾지 못했습니다. 다른 방식으로 요청해주세요.";

/// Engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    AwaitInput,
    GatingInput,
    Routing,
    ExecutingWorker,
    GatingOutput,
    Terminated,
}

impl EngineState {
    pub fn can_transition_to(&self, target: EngineState) -> bool {
        use EngineState::*;

        matches!(
            (self, target),
            (AwaitInput, GatingInput) |
            // Input gate: pass or refuse
            (GatingInput, Routing) | (GatingInput, Terminated) |
            // Router: dispatch, finish, or protocol failure
            (Routing, ExecutingWorker) | (Routing, Terminated) |
            // Worker: reply, or fatal cycle error
            (ExecutingWorker, GatingOutput) | (ExecutingWorker, Terminated) |
            // Output gate: back to the router, or refuse
            (GatingOutput, Routing) | (GatingOutput, Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitInput => "await_input",
            Self::GatingInput => "gating_input",
            Self::Routing => "routing",
            Self::ExecutingWorker => "executing_worker",
            Self::GatingOutput => "gating_output",
            Self::Terminated => "terminated",
        };
        write!(f, "{s}")
    }
}

/// Why a cycle ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleFailure {
    UnknownTool { worker: String, tool: String },
    InvalidRouteDecision { value: String },
    CapabilityUnavailable { reason: String },
}

impl CycleFailure {
    /// Fixed reply shown to the user; internal details never leak.
    pub fn reply(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => UNKNOWN_TOOL_REPLY,
            Self::InvalidRouteDecision { .. } | Self::CapabilityUnavailable { .. } => {
                GENERIC_FAILURE_REPLY
            }
        }
    }
}

impl From<RouteError> for CycleFailure {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::InvalidDecision { value } => Self::InvalidRouteDecision { value },
            RouteError::Capability(e) => Self::CapabilityUnavailable {
                reason: e.to_string(),
            },
        }
    }
}

impl From<WorkerError> for CycleFailure {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::UnknownTool { worker, tool } => Self::UnknownTool { worker, tool },
            WorkerError::Capability(e) => Self::CapabilityUnavailable {
                reason: e.to_string(),
            },
        }
    }
}

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Router signalled completion.
    Completed,
    /// The cycle budget ran out before the router finished.
    CycleLimit,
    InputBlocked,
    OutputBlocked,
    Failed(CycleFailure),
}

/// Result of `submit_turn`.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub reply: String,
    pub session_id: String,
    pub outcome: TurnOutcome,
    /// Advice attached by the input gate when the message was allowed but
    /// touched a sensitive topic.
    pub advisory: Option<String>,
    pub cycles: u32,
}

/// Memory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub session_count: usize,
    pub total_turn_count: usize,
}

/// Shared dependencies for the engine.
pub struct EngineDeps {
    pub memory: Arc<dyn MemoryStore>,
    pub gate: Arc<GuardrailGate>,
    pub router: Router,
    pub workers: Vec<WorkerAdapter>,
}

/// The orchestration engine.
pub struct Engine {
    config: EngineConfig,
    memory: Arc<dyn MemoryStore>,
    gate: Arc<GuardrailGate>,
    router: Router,
    workers: HashMap<WorkerKind, WorkerAdapter>,
}

/// Tracks the state of one turn and checks each transition.
struct TurnMachine<'a> {
    session_id: &'a str,
    state: EngineState,
}

impl<'a> TurnMachine<'a> {
    fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            state: EngineState::AwaitInput,
        }
    }

    fn advance(&mut self, to: EngineState) {
        if !self.state.can_transition_to(to) {
            tracing::error!(
                session_id = %self.session_id,
                from = %self.state,
                to = %to,
                "Invalid engine state transition"
            );
        }
        tracing::debug!(session_id = %self.session_id, from = %self.state, to = %to, "Engine transition");
        self.state = to;
    }
}

impl Engine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        let workers = deps
            .workers
            .into_iter()
            .map(|worker| (worker.kind(), worker))
            .collect();
        Self {
            config,
            memory: deps.memory,
            gate: deps.gate,
            router: deps.router,
            workers,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drive one user turn to `Terminated` and return the recorded reply.
    pub async fn submit_turn(&self, session_id: Option<String>, message: &str) -> TurnResponse {
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let ctx = CycleContext::new(&session_id, self.config.request_timeout);
        let mut machine = TurnMachine::new(&session_id);

        tracing::info!(session_id = %session_id, "Turn received");
        machine.advance(EngineState::GatingInput);

        let verdict = self.gate.inspect(message);
        if !verdict.safe {
            tracing::warn!(
                session_id = %session_id,
                reason = %verdict.reason,
                matched = ?verdict.matched_terms,
                "Input blocked by guardrail"
            );
            let refusal = self.gate.refusal(&verdict);
            self.memory.append(&session_id, NewTurn::system(&refusal));
            machine.advance(EngineState::Terminated);
            return TurnResponse {
                reply: refusal,
                session_id,
                outcome: TurnOutcome::InputBlocked,
                advisory: None,
                cycles: 0,
            };
        }
        let advisory = verdict.is_advisory().then(|| {
            tracing::info!(session_id = %session_id, matched = ?verdict.matched_terms, "Advisory input");
            format!("{} {}", verdict.reason, verdict.suggestions.join(" "))
                .trim()
                .to_string()
        });

        self.memory.append(&session_id, NewTurn::user(message));

        let mut last_reply: Option<String> = None;
        let mut cycles = 0;
        while cycles < self.config.max_cycles {
            machine.advance(EngineState::Routing);
            let cycle_ctx = ctx.for_cycle(cycles);
            cycles += 1;

            if cycle_ctx.is_expired() {
                let failure = CycleFailure::CapabilityUnavailable {
                    reason: "request deadline exceeded".to_string(),
                };
                return self.fail(&mut machine, failure, advisory, cycles);
            }

            let turns = self.memory.read(&session_id);
            let decision = match self.router.decide(&turns, &cycle_ctx).await {
                Ok(decision) => decision,
                Err(e) => return self.fail(&mut machine, e.into(), advisory, cycles),
            };

            let kind = match decision {
                RouteDecision::Terminate => {
                    machine.advance(EngineState::Terminated);
                    tracing::info!(session_id = %session_id, cycles, "Turn completed");
                    return TurnResponse {
                        reply: last_reply.unwrap_or_else(|| DEFAULT_COMPLETION_REPLY.to_string()),
                        session_id,
                        outcome: TurnOutcome::Completed,
                        advisory,
                        cycles,
                    };
                }
                RouteDecision::Worker(kind) => kind,
            };

            let Some(worker) = self.workers.get(&kind) else {
                let failure = CycleFailure::InvalidRouteDecision {
                    value: kind.to_string(),
                };
                return self.fail(&mut machine, failure, advisory, cycles);
            };

            machine.advance(EngineState::ExecutingWorker);
            tracing::info!(session_id = %session_id, cycle = cycle_ctx.cycle, worker = %kind, "Dispatching worker");
            let run = match worker.run(&turns, ScratchPad::new(), &cycle_ctx).await {
                Ok(run) => run,
                Err(e) => return self.fail(&mut machine, e.into(), advisory, cycles),
            };

            machine.advance(EngineState::GatingOutput);
            let verdict = self.gate.inspect(&run.reply);
            if !verdict.safe {
                tracing::warn!(
                    session_id = %session_id,
                    worker = %kind,
                    reason = %verdict.reason,
                    matched = ?verdict.matched_terms,
                    "Worker reply blocked by guardrail"
                );
                let refusal = self.gate.output_refusal().to_string();
                self.memory.append(&session_id, NewTurn::system(&refusal));
                machine.advance(EngineState::Terminated);
                return TurnResponse {
                    reply: refusal,
                    session_id,
                    outcome: TurnOutcome::OutputBlocked,
                    advisory,
                    cycles,
                };
            }

            self.memory
                .append(&session_id, NewTurn::worker(kind, &run.reply));
            last_reply = Some(run.reply);
        }

        machine.advance(EngineState::Routing);
        machine.advance(EngineState::Terminated);
        tracing::warn!(session_id = %session_id, cycles, "Cycle limit reached");
        TurnResponse {
            reply: last_reply.unwrap_or_else(|| DEFAULT_COMPLETION_REPLY.to_string()),
            session_id,
            outcome: TurnOutcome::CycleLimit,
            advisory,
            cycles,
        }
    }

    fn fail(
        &self,
        machine: &mut TurnMachine<'_>,
        failure: CycleFailure,
        advisory: Option<String>,
        cycles: u32,
    ) -> TurnResponse {
        tracing::error!(session_id = %machine.session_id, failure = ?failure, "Cycle failed");
        let reply = failure.reply().to_string();
        self.memory
            .append(machine.session_id, NewTurn::system(&reply));
        machine.advance(EngineState::Terminated);
        TurnResponse {
            reply,
            session_id: machine.session_id.to_string(),
            outcome: TurnOutcome::Failed(failure),
            advisory,
            cycles,
        }
    }

    /// Retained turns for a session, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        self.memory.read(session_id)
    }

    pub fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.memory.session_info(session_id)
    }

    pub fn clear_history(&self, session_id: &str) {
        self.memory.clear(session_id);
        tracing::info!(session_id = %session_id, "History cleared");
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            session_count: self.memory.session_count(),
            total_turn_count: self.memory.total_turn_count(),
        }
    }
}
