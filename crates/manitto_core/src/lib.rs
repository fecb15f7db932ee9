//! Core domain logic for the manitto (secret gift-giver) game.
//! This crate is the single source of truth for allocation invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::AllocationConfig;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::assignment::{AllocatedTarget, AllocationOutcome, Assignment, AssignmentId};
pub use model::roster::{
    Mission, MissionId, Participant, ParticipantId, Round, RoundId, RosterValidationError,
};
pub use repo::ledger_repo::{
    CommitConflict, CommitOutcome, LedgerError, LedgerRepository, LedgerResult,
    SqliteLedgerRepository,
};
pub use repo::memory::{MemoryLedger, MemoryRoster};
pub use repo::roster_repo::{RosterError, RosterRepository, RosterResult, SqliteRosterRepository};
pub use service::allocation_service::{
    eligible_targets, AllocationError, AllocationService, StorageFailure,
};
pub use service::round_service::{
    AssignmentSummary, ParticipantStatus, RoundService, RoundServiceError, RoundStatus,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
