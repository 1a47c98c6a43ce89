//! Orchestration: the router and the per-turn engine.

pub mod engine;
pub mod router;

pub use engine::{
    CycleFailure, DEFAULT_COMPLETION_REPLY, Engine, EngineDeps, EngineState, EngineStats,
    GENERIC_FAILURE_REPLY, TurnOutcome, TurnResponse, UNKNOWN_TOOL_REPLY,
};
pub use router::{RouteDecision, Router, TERMINATE};
