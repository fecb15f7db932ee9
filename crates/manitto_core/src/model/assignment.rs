//! Assignment ledger model and allocation results.
//!
//! # Responsibility
//! - Define the single record the allocation engine writes.
//! - Define the typed outcomes returned to allocation callers.
//!
//! # Invariants
//! - `source_participant_id != target_participant_id`.
//! - At most one assignment per `(round_id, source_participant_id)`.
//! - At most one assignment per `(round_id, target_participant_id)`.
//! - Missions may repeat across sources.

use crate::model::roster::{Mission, MissionId, Participant, ParticipantId, RoundId};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable assignment identifier.
pub type AssignmentId = Uuid;

/// Committed match of one source participant to a target and a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_id: AssignmentId,
    pub round_id: RoundId,
    pub source_participant_id: ParticipantId,
    pub target_participant_id: ParticipantId,
    pub mission_id: MissionId,
    /// Unix epoch milliseconds at which the engine built the commit.
    pub created_at_ms: i64,
}

impl Assignment {
    /// Builds an uncommitted assignment stamped with the current time.
    pub fn new(
        round_id: RoundId,
        source_participant_id: ParticipantId,
        target_participant_id: ParticipantId,
        mission_id: MissionId,
    ) -> Self {
        Self {
            assignment_id: Uuid::new_v4(),
            round_id,
            source_participant_id,
            target_participant_id,
            mission_id,
            created_at_ms: now_epoch_ms(),
        }
    }

    /// Returns whether the assignment matches a participant to themselves.
    pub fn is_self_match(&self) -> bool {
        self.source_participant_id == self.target_participant_id
    }
}

/// What a requester learns about their committed assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedTarget {
    pub assignment_id: AssignmentId,
    pub target_participant_id: ParticipantId,
    pub target_display_name: String,
    pub target_image_ref: Option<String>,
    pub mission_id: MissionId,
    pub mission_content: String,
    pub created_at_ms: i64,
}

impl AllocatedTarget {
    /// Joins a committed assignment with its target and mission records.
    pub fn from_parts(assignment: &Assignment, target: &Participant, mission: &Mission) -> Self {
        Self {
            assignment_id: assignment.assignment_id,
            target_participant_id: target.participant_id,
            target_display_name: target.display_name.clone(),
            target_image_ref: target.image_ref.clone(),
            mission_id: mission.mission_id,
            mission_content: mission.content.clone(),
            created_at_ms: assignment.created_at_ms,
        }
    }
}

/// Non-error result of an allocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AllocationOutcome {
    /// The requester holds this assignment (new or previously committed).
    Allocated(AllocatedTarget),
    /// Every participant other than the requester is already claimed.
    ///
    /// Pure incremental allocation can strand the last requester this way;
    /// recovery is left to an administrator reset.
    NoTargetsAvailable,
}

impl AllocationOutcome {
    /// Returns the allocated target, if any.
    pub fn allocated(&self) -> Option<&AllocatedTarget> {
        match self {
            Self::Allocated(target) => Some(target),
            Self::NoTargetsAvailable => None,
        }
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
