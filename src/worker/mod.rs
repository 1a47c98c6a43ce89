//! Workers: the specialized capabilities the router dispatches to.
//!
//! - `kind`: the closed worker set and its wire names
//! - `adapter`: the bounded tool loop that drives one worker per cycle
//! - `scratchpad`: per-cycle tool traffic
//! - `prompts`: system prompts

pub mod adapter;
pub mod kind;
pub mod prompts;
pub mod scratchpad;

pub use adapter::{TOOL_LIMIT_REPLY, WorkerAdapter, WorkerLimits, WorkerRun, history_messages};
pub use kind::{UnknownWorker, WorkerKind};
pub use scratchpad::{ScratchPad, ToolResult, ToolRound};
