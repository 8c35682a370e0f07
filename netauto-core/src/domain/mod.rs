//! Core domain types
//!
//! This module contains the structures the orchestrator works with.
//! They carry no I/O: collaborators (LLM providers, device drivers, audit
//! stores) live in the orchestrator and exchange these values.

pub mod audit;
pub mod deployment;
pub mod device;
pub mod event;
pub mod generation;
pub mod pipeline;
