//! Data Transfer Objects for the HTTP boundary
//!
//! Request bodies accepted by the orchestrator API and the lightweight
//! views it returns.

pub mod llm;
pub mod operation;
pub mod pipeline;
