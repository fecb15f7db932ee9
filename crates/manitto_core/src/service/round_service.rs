//! Round administration service.
//!
//! # Responsibility
//! - Bulk reset of a round's assignments.
//! - Allocation progress board and assignment overview for administrators.
//!
//! # Invariants
//! - Reset removes every assignment of the round and nothing else.
//! - Overviews are read-only.

use crate::model::roster::{ParticipantId, Round, RoundId};
use crate::repo::ledger_repo::{LedgerError, LedgerRepository};
use crate::repo::roster_repo::{RosterError, RosterRepository};
use crate::service::allocation_service::StorageFailure;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from round administration operations.
#[derive(Debug)]
pub enum RoundServiceError {
    RoundNotFound(RoundId),
    Storage(StorageFailure),
}

impl Display for RoundServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundNotFound(id) => write!(f, "round not found: {id}"),
            Self::Storage(err) => write!(f, "storage unavailable: {err}"),
        }
    }
}

impl Error for RoundServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RoundNotFound(_) => None,
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<RosterError> for RoundServiceError {
    fn from(value: RosterError) -> Self {
        match value {
            RosterError::RoundNotFound(id) => Self::RoundNotFound(id),
            other => Self::Storage(StorageFailure::Roster(other)),
        }
    }
}

impl From<LedgerError> for RoundServiceError {
    fn from(value: LedgerError) -> Self {
        Self::Storage(StorageFailure::Ledger(value))
    }
}

/// Allocation state of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStatus {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub has_allocated: bool,
}

/// Allocation progress of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundStatus {
    pub round: Round,
    pub participant_count: usize,
    pub assigned_count: usize,
    /// In roster order.
    pub participants: Vec<ParticipantStatus>,
}

impl RoundStatus {
    /// Returns whether every participant holds an assignment.
    pub fn is_complete(&self) -> bool {
        self.participant_count > 0 && self.assigned_count == self.participant_count
    }
}

/// Human-readable view of one committed assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    pub source_display_name: String,
    pub target_display_name: String,
    pub mission_content: String,
    pub created_at_ms: i64,
}

/// Administrative facade over a round's roster and ledger.
pub struct RoundService<R: RosterRepository, L: LedgerRepository> {
    roster: R,
    ledger: L,
}

impl<R: RosterRepository, L: LedgerRepository> RoundService<R, L> {
    pub fn new(roster: R, ledger: L) -> Self {
        Self { roster, ledger }
    }

    /// Deletes every assignment of the round.
    ///
    /// Afterwards every participant may allocate again. Returns the number of
    /// removed assignments.
    pub fn reset_round(&self, round_id: RoundId) -> Result<usize, RoundServiceError> {
        self.load_round(round_id)?;
        let removed = self.ledger.reset_round(round_id)?;
        info!(
            "event=round_reset module=service status=ok round_id={} removed={}",
            round_id, removed
        );
        Ok(removed)
    }

    /// Returns who has allocated so far.
    pub fn allocation_status(&self, round_id: RoundId) -> Result<RoundStatus, RoundServiceError> {
        let round = self.load_round(round_id)?;
        let participants = self.roster.list_participants(round_id)?;
        let sources: HashSet<ParticipantId> = self
            .ledger
            .list_assignments(round_id)?
            .into_iter()
            .map(|assignment| assignment.source_participant_id)
            .collect();

        let participants: Vec<ParticipantStatus> = participants
            .into_iter()
            .map(|p| ParticipantStatus {
                has_allocated: sources.contains(&p.participant_id),
                participant_id: p.participant_id,
                display_name: p.display_name,
            })
            .collect();
        let assigned_count = participants.iter().filter(|p| p.has_allocated).count();

        Ok(RoundStatus {
            round,
            participant_count: participants.len(),
            assigned_count,
            participants,
        })
    }

    /// Lists committed assignments with names and mission text, oldest first.
    pub fn list_assignment_summaries(
        &self,
        round_id: RoundId,
    ) -> Result<Vec<AssignmentSummary>, RoundServiceError> {
        self.load_round(round_id)?;
        let names: HashMap<ParticipantId, String> = self
            .roster
            .list_participants(round_id)?
            .into_iter()
            .map(|p| (p.participant_id, p.display_name))
            .collect();
        let missions: HashMap<_, String> = self
            .roster
            .list_missions(round_id)?
            .into_iter()
            .map(|m| (m.mission_id, m.content))
            .collect();

        self.ledger
            .list_assignments(round_id)?
            .into_iter()
            .map(|assignment| -> Result<AssignmentSummary, RoundServiceError> {
                let lookup = |id: &ParticipantId| {
                    names.get(id).cloned().ok_or_else(|| {
                        dangling(format!(
                            "assignment {} references unknown participant {id}",
                            assignment.assignment_id
                        ))
                    })
                };
                Ok(AssignmentSummary {
                    source_display_name: lookup(&assignment.source_participant_id)?,
                    target_display_name: lookup(&assignment.target_participant_id)?,
                    mission_content: missions
                        .get(&assignment.mission_id)
                        .cloned()
                        .ok_or_else(|| {
                            dangling(format!(
                                "assignment {} references unknown mission {}",
                                assignment.assignment_id, assignment.mission_id
                            ))
                        })?,
                    created_at_ms: assignment.created_at_ms,
                })
            })
            .collect()
    }

    fn load_round(&self, round_id: RoundId) -> Result<Round, RoundServiceError> {
        self.roster
            .get_round(round_id)?
            .ok_or(RoundServiceError::RoundNotFound(round_id))
    }
}

fn dangling(message: String) -> RoundServiceError {
    RoundServiceError::Storage(StorageFailure::DanglingReference(message))
}
