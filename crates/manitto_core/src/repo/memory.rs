//! In-process roster and ledger implementations.
//!
//! # Responsibility
//! - Serve embedders that keep round state in process memory.
//! - Give tests a fast, thread-safe backend with the same contracts as the
//!   SQLite repositories.
//!
//! # Invariants
//! - The ledger keeps one `Mutex` per round; commits for different rounds
//!   never contend.
//! - A commit checks source and target uniqueness and inserts while holding
//!   the round lock.
//! - A poisoned lock surfaces as `LockPoisoned`, never as an empty read.
//! - Only commits create per-round ledger entries; reads of an unknown round
//!   return empty results.

use crate::model::assignment::Assignment;
use crate::model::roster::{Mission, Participant, ParticipantId, Round, RoundId};
use crate::repo::ledger_repo::{
    CommitConflict, CommitOutcome, LedgerError, LedgerRepository, LedgerResult,
};
use crate::repo::roster_repo::{RosterError, RosterRepository, RosterResult};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug)]
struct RoundRoster {
    round: Round,
    participants: Vec<Participant>,
    missions: Vec<Mission>,
}

/// Thread-safe in-memory roster.
#[derive(Debug, Default)]
pub struct MemoryRoster {
    rounds: RwLock<HashMap<RoundId, RoundRoster>>,
}

impl MemoryRoster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RosterRepository for MemoryRoster {
    fn get_round(&self, round_id: RoundId) -> RosterResult<Option<Round>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| RosterError::LockPoisoned("roster.get_round"))?;
        Ok(rounds.get(&round_id).map(|entry| entry.round.clone()))
    }

    fn list_participants(&self, round_id: RoundId) -> RosterResult<Vec<Participant>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| RosterError::LockPoisoned("roster.list_participants"))?;
        let mut participants = rounds
            .get(&round_id)
            .map(|entry| entry.participants.clone())
            .unwrap_or_default();
        participants.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        Ok(participants)
    }

    fn list_missions(&self, round_id: RoundId) -> RosterResult<Vec<Mission>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| RosterError::LockPoisoned("roster.list_missions"))?;
        Ok(rounds
            .get(&round_id)
            .map(|entry| entry.missions.clone())
            .unwrap_or_default())
    }

    fn create_round(&self, name: &str) -> RosterResult<Round> {
        let round = Round::new(name)?;
        let mut rounds = self
            .rounds
            .write()
            .map_err(|_| RosterError::LockPoisoned("roster.create_round"))?;
        rounds.insert(
            round.round_id,
            RoundRoster {
                round: round.clone(),
                participants: Vec::new(),
                missions: Vec::new(),
            },
        );
        Ok(round)
    }

    fn add_participant(
        &self,
        round_id: RoundId,
        display_name: &str,
        image_ref: Option<&str>,
    ) -> RosterResult<Participant> {
        let participant =
            Participant::new(round_id, display_name, image_ref.map(str::to_string))?;
        let mut rounds = self
            .rounds
            .write()
            .map_err(|_| RosterError::LockPoisoned("roster.add_participant"))?;
        let entry = rounds
            .get_mut(&round_id)
            .ok_or(RosterError::RoundNotFound(round_id))?;
        entry.participants.push(participant.clone());
        Ok(participant)
    }

    fn add_mission(&self, round_id: RoundId, content: &str) -> RosterResult<Mission> {
        let mission = Mission::new(round_id, content)?;
        let mut rounds = self
            .rounds
            .write()
            .map_err(|_| RosterError::LockPoisoned("roster.add_mission"))?;
        let entry = rounds
            .get_mut(&round_id)
            .ok_or(RosterError::RoundNotFound(round_id))?;
        entry.missions.push(mission.clone());
        Ok(mission)
    }
}

#[derive(Debug, Default)]
struct RoundLedger {
    by_source: HashMap<ParticipantId, Assignment>,
    claimed_targets: HashSet<ParticipantId>,
}

/// Thread-safe in-memory ledger with per-round locking.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    rounds: RwLock<HashMap<RoundId, Arc<Mutex<RoundLedger>>>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_round(&self, round_id: RoundId) -> LedgerResult<Option<Arc<Mutex<RoundLedger>>>> {
        let rounds = self
            .rounds
            .read()
            .map_err(|_| LedgerError::LockPoisoned("ledger.round"))?;
        Ok(rounds.get(&round_id).map(Arc::clone))
    }

    /// Returns the round entry, creating it on first commit.
    fn round_for_commit(&self, round_id: RoundId) -> LedgerResult<Arc<Mutex<RoundLedger>>> {
        if let Some(entry) = self.existing_round(round_id)? {
            return Ok(entry);
        }

        let mut rounds = self
            .rounds
            .write()
            .map_err(|_| LedgerError::LockPoisoned("ledger.round"))?;
        Ok(Arc::clone(rounds.entry(round_id).or_default()))
    }
}

impl LedgerRepository for MemoryLedger {
    fn get_assignment(
        &self,
        round_id: RoundId,
        source_id: ParticipantId,
    ) -> LedgerResult<Option<Assignment>> {
        let Some(round) = self.existing_round(round_id)? else {
            return Ok(None);
        };
        let ledger = round
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("ledger.get_assignment"))?;
        Ok(ledger.by_source.get(&source_id).cloned())
    }

    fn list_claimed_targets(&self, round_id: RoundId) -> LedgerResult<HashSet<ParticipantId>> {
        let Some(round) = self.existing_round(round_id)? else {
            return Ok(HashSet::new());
        };
        let ledger = round
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("ledger.list_claimed_targets"))?;
        Ok(ledger.claimed_targets.clone())
    }

    fn list_assignments(&self, round_id: RoundId) -> LedgerResult<Vec<Assignment>> {
        let Some(round) = self.existing_round(round_id)? else {
            return Ok(Vec::new());
        };
        let ledger = round
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("ledger.list_assignments"))?;
        let mut assignments: Vec<Assignment> = ledger.by_source.values().cloned().collect();
        assignments.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.assignment_id.cmp(&b.assignment_id))
        });
        Ok(assignments)
    }

    fn try_commit(&self, assignment: &Assignment) -> LedgerResult<CommitOutcome> {
        if assignment.is_self_match() {
            return Err(LedgerError::SelfMatch(assignment.source_participant_id));
        }

        let round = self.round_for_commit(assignment.round_id)?;
        let mut ledger = round
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("ledger.try_commit"))?;

        if ledger
            .by_source
            .contains_key(&assignment.source_participant_id)
        {
            return Ok(CommitOutcome::Conflict(
                CommitConflict::SourceAlreadyAssigned,
            ));
        }
        if ledger
            .claimed_targets
            .contains(&assignment.target_participant_id)
        {
            return Ok(CommitOutcome::Conflict(CommitConflict::TargetAlreadyClaimed));
        }

        ledger
            .claimed_targets
            .insert(assignment.target_participant_id);
        ledger
            .by_source
            .insert(assignment.source_participant_id, assignment.clone());
        Ok(CommitOutcome::Committed)
    }

    fn reset_round(&self, round_id: RoundId) -> LedgerResult<usize> {
        let Some(round) = self.existing_round(round_id)? else {
            return Ok(0);
        };
        let mut ledger = round
            .lock()
            .map_err(|_| LedgerError::LockPoisoned("ledger.reset_round"))?;
        let removed = ledger.by_source.len();
        ledger.by_source.clear();
        ledger.claimed_targets.clear();
        Ok(removed)
    }
}
