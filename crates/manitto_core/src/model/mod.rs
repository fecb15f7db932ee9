//! Domain model for rounds, their rosters and committed assignments.
//!
//! # Responsibility
//! - Define canonical data structures shared by repositories and services.
//! - Keep roster records (administered externally) apart from the ledger
//!   records the allocation engine writes.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - An `Assignment` is created once and never updated.

pub mod assignment;
pub mod roster;
