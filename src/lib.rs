//! Switchboard: guarded multi-worker LLM orchestration.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod llm;
pub mod memory;
pub mod tools;
pub mod worker;
