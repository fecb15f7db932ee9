//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the roster (read-mostly registry) and ledger (assignment
//!   arbitration) contracts consumed by the allocation service.
//! - Isolate SQLite query details from service orchestration.
//! - Provide in-process implementations with the same contracts.
//!
//! # Invariants
//! - Ledger commits are atomic conditional writes: a commit either inserts
//!   the row or reports the conflict that prevented it, never both.
//! - Repository APIs return semantic errors (`RoundNotFound`, conflicts) in
//!   addition to transport errors.

pub mod ledger_repo;
pub mod memory;
pub mod roster_repo;
