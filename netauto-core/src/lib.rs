//! Netauto Core
//!
//! Core types shared by the network automation services.
//!
//! This crate contains:
//! - Domain types: pipeline runs, device collaborator values, event envelopes, audit entries
//! - DTOs: request/response shapes for the HTTP boundary

pub mod domain;
pub mod dto;
