//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate roster and ledger calls into use-case level APIs.
//! - Keep CLI and embedding layers decoupled from storage details.

pub mod allocation_service;
pub mod round_service;
