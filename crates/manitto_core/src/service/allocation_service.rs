//! Allocation use-case service.
//!
//! # Responsibility
//! - Hand each requester exactly one target and one mission, on demand.
//! - Return the committed assignment unchanged on repeated calls.
//! - Resolve commit races internally by re-reading and retrying.
//!
//! # Invariants
//! - Nobody is matched to themselves.
//! - A target, once claimed in a round, is never offered again.
//! - Eligible targets are recomputed from storage on every attempt.
//! - Nothing is reserved before a successful commit, so an abandoned call
//!   leaves no side effect.
//! - Missions are drawn independently and may repeat across sources.

use crate::config::AllocationConfig;
use crate::model::assignment::{AllocatedTarget, AllocationOutcome, Assignment};
use crate::model::roster::{Mission, Participant, ParticipantId, RoundId};
use crate::repo::ledger_repo::{CommitOutcome, LedgerError, LedgerRepository};
use crate::repo::roster_repo::{RosterError, RosterRepository};
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Storage-side failure that prevents a definite answer.
#[derive(Debug)]
pub enum StorageFailure {
    Roster(RosterError),
    Ledger(LedgerError),
    /// A committed assignment points at a participant or mission that no
    /// longer exists in the roster.
    DanglingReference(String),
}

impl Display for StorageFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Roster(err) => write!(f, "roster: {err}"),
            Self::Ledger(err) => write!(f, "ledger: {err}"),
            Self::DanglingReference(message) => write!(f, "dangling reference: {message}"),
        }
    }
}

impl Error for StorageFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Roster(err) => Some(err),
            Self::Ledger(err) => Some(err),
            Self::DanglingReference(_) => None,
        }
    }
}

/// Errors from allocation requests.
///
/// `NoTargetsAvailable` is not an error; see [`AllocationOutcome`].
#[derive(Debug)]
pub enum AllocationError {
    /// Round id is unknown to the roster.
    RoundNotFound(RoundId),
    /// Requester is not a participant of the round.
    ParticipantNotFound {
        round_id: RoundId,
        participant_id: ParticipantId,
    },
    /// The round has no missions to hand out.
    MissionPoolEmpty(RoundId),
    /// Every attempt lost a commit race; safe to retry later.
    TransientConflict { attempts: u32 },
    /// Roster or ledger could not be read or written.
    StorageUnavailable(StorageFailure),
}

impl AllocationError {
    /// Returns whether the error is a definite not-found answer.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::RoundNotFound(_) | Self::ParticipantNotFound { .. }
        )
    }

    /// Returns whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientConflict { .. })
    }

    fn code(&self) -> &'static str {
        match self {
            Self::RoundNotFound(_) => "round_not_found",
            Self::ParticipantNotFound { .. } => "participant_not_found",
            Self::MissionPoolEmpty(_) => "mission_pool_empty",
            Self::TransientConflict { .. } => "transient_conflict",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl Display for AllocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundNotFound(id) => write!(f, "round not found: {id}"),
            Self::ParticipantNotFound {
                round_id,
                participant_id,
            } => write!(
                f,
                "participant {participant_id} not found in round {round_id}"
            ),
            Self::MissionPoolEmpty(id) => write!(f, "round {id} has no missions"),
            Self::TransientConflict { attempts } => write!(
                f,
                "allocation lost {attempts} commit races in a row; retry later"
            ),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
        }
    }
}

impl Error for AllocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RosterError> for AllocationError {
    fn from(value: RosterError) -> Self {
        Self::StorageUnavailable(StorageFailure::Roster(value))
    }
}

impl From<LedgerError> for AllocationError {
    fn from(value: LedgerError) -> Self {
        Self::StorageUnavailable(StorageFailure::Ledger(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Existing,
    Committed,
    Exhausted,
}

impl Resolution {
    fn as_str(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Committed => "committed",
            Self::Exhausted => "no_targets_available",
        }
    }
}

/// Requester-driven, incremental allocation over a roster and a ledger.
pub struct AllocationService<R: RosterRepository, L: LedgerRepository> {
    roster: R,
    ledger: L,
    config: AllocationConfig,
}

impl<R: RosterRepository, L: LedgerRepository> AllocationService<R, L> {
    /// Creates a service with the default retry budget.
    pub fn new(roster: R, ledger: L) -> Self {
        Self::with_config(roster, ledger, AllocationConfig::default())
    }

    pub fn with_config(roster: R, ledger: L, config: AllocationConfig) -> Self {
        Self {
            roster,
            ledger,
            config: config.normalized(),
        }
    }

    /// Returns the requester's assignment, committing a new one if needed.
    ///
    /// # Contract
    /// - Repeated calls by the same requester return the same assignment.
    /// - `Ok(NoTargetsAvailable)` when every other participant is claimed.
    /// - Unknown round or requester fails without touching the ledger.
    pub fn allocate(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<AllocationOutcome, AllocationError> {
        self.allocate_with_rng(round_id, participant_id, &mut rand::thread_rng())
    }

    /// Same as [`Self::allocate`] with a caller-provided random source.
    pub fn allocate_with_rng<G: Rng + ?Sized>(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
        rng: &mut G,
    ) -> Result<AllocationOutcome, AllocationError> {
        let started_at = Instant::now();
        match self.allocate_inner(round_id, participant_id, rng) {
            Ok((outcome, resolution, attempt)) => {
                info!(
                    "event=allocate module=service status=ok round_id={} participant_id={} outcome={} attempt={} duration_ms={}",
                    round_id,
                    participant_id,
                    resolution.as_str(),
                    attempt,
                    started_at.elapsed().as_millis()
                );
                Ok(outcome)
            }
            Err(err) => {
                if matches!(err, AllocationError::StorageUnavailable(_)) {
                    error!(
                        "event=allocate module=service status=error round_id={} participant_id={} error_code={} error={}",
                        round_id,
                        participant_id,
                        err.code(),
                        err
                    );
                } else {
                    warn!(
                        "event=allocate module=service status=rejected round_id={} participant_id={} error_code={} duration_ms={}",
                        round_id,
                        participant_id,
                        err.code(),
                        started_at.elapsed().as_millis()
                    );
                }
                Err(err)
            }
        }
    }

    /// Returns the requester's committed assignment without allocating.
    pub fn current_assignment(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<Option<AllocatedTarget>, AllocationError> {
        self.ensure_round(round_id)?;
        let participants = self.roster.list_participants(round_id)?;
        ensure_member(&participants, round_id, participant_id)?;

        match self.ledger.get_assignment(round_id, participant_id)? {
            Some(existing) => Ok(Some(self.resolve(&existing, &participants)?)),
            None => Ok(None),
        }
    }

    fn allocate_inner<G: Rng + ?Sized>(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
        rng: &mut G,
    ) -> Result<(AllocationOutcome, Resolution, u32), AllocationError> {
        self.ensure_round(round_id)?;

        for attempt in 1..=self.config.max_attempts {
            let participants = self.roster.list_participants(round_id)?;
            ensure_member(&participants, round_id, participant_id)?;

            if let Some(existing) = self.ledger.get_assignment(round_id, participant_id)? {
                let target = self.resolve(&existing, &participants)?;
                return Ok((AllocationOutcome::Allocated(target), Resolution::Existing, attempt));
            }

            let missions = self.roster.list_missions(round_id)?;
            let Some(mission) = missions.choose(rng) else {
                return Err(AllocationError::MissionPoolEmpty(round_id));
            };

            let claimed = self.ledger.list_claimed_targets(round_id)?;
            let eligible = eligible_targets(&participants, participant_id, &claimed);
            let Some(target) = eligible.choose(rng).copied() else {
                return Ok((AllocationOutcome::NoTargetsAvailable, Resolution::Exhausted, attempt));
            };

            let assignment =
                Assignment::new(round_id, participant_id, target.participant_id, mission.mission_id);
            match self.ledger.try_commit(&assignment)? {
                CommitOutcome::Committed => {
                    let allocated = AllocatedTarget::from_parts(&assignment, target, mission);
                    return Ok((
                        AllocationOutcome::Allocated(allocated),
                        Resolution::Committed,
                        attempt,
                    ));
                }
                CommitOutcome::Conflict(conflict) => {
                    debug!(
                        "event=commit_conflict module=service status=retry round_id={} participant_id={} attempt={} reason={}",
                        round_id,
                        participant_id,
                        attempt,
                        conflict.as_str()
                    );
                }
            }
        }

        Err(AllocationError::TransientConflict {
            attempts: self.config.max_attempts,
        })
    }

    fn ensure_round(&self, round_id: RoundId) -> Result<(), AllocationError> {
        if self.roster.get_round(round_id)?.is_none() {
            return Err(AllocationError::RoundNotFound(round_id));
        }
        Ok(())
    }

    fn resolve(
        &self,
        assignment: &Assignment,
        participants: &[Participant],
    ) -> Result<AllocatedTarget, AllocationError> {
        let target = participants
            .iter()
            .find(|p| p.participant_id == assignment.target_participant_id)
            .ok_or_else(|| {
                AllocationError::StorageUnavailable(StorageFailure::DanglingReference(format!(
                    "assignment {} targets unknown participant {}",
                    assignment.assignment_id, assignment.target_participant_id
                )))
            })?;
        let missions = self.roster.list_missions(assignment.round_id)?;
        let mission = find_mission(&missions, assignment)?;
        Ok(AllocatedTarget::from_parts(assignment, target, mission))
    }
}

/// Participants the requester may be matched to right now.
///
/// Everyone in the round except the requester and anyone already claimed as
/// a target, in roster order.
pub fn eligible_targets<'a>(
    participants: &'a [Participant],
    requester: ParticipantId,
    claimed: &HashSet<ParticipantId>,
) -> Vec<&'a Participant> {
    participants
        .iter()
        .filter(|p| p.participant_id != requester && !claimed.contains(&p.participant_id))
        .collect()
}

fn ensure_member(
    participants: &[Participant],
    round_id: RoundId,
    participant_id: ParticipantId,
) -> Result<(), AllocationError> {
    if participants
        .iter()
        .any(|p| p.participant_id == participant_id)
    {
        return Ok(());
    }
    Err(AllocationError::ParticipantNotFound {
        round_id,
        participant_id,
    })
}

fn find_mission<'a>(
    missions: &'a [Mission],
    assignment: &Assignment,
) -> Result<&'a Mission, AllocationError> {
    missions
        .iter()
        .find(|m| m.mission_id == assignment.mission_id)
        .ok_or_else(|| {
            AllocationError::StorageUnavailable(StorageFailure::DanglingReference(format!(
                "assignment {} references unknown mission {}",
                assignment.assignment_id, assignment.mission_id
            )))
        })
}
