//! Assignment ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store committed assignments, one row per `(round, source)`.
//! - Arbitrate racing commits so that a source is assigned at most once and
//!   a target is claimed at most once per round.
//!
//! # Invariants
//! - `try_commit` checks and inserts under one `BEGIN IMMEDIATE`
//!   transaction; a successful commit is visible to every later read on any
//!   connection.
//! - A rejected commit leaves no trace.
//! - Self-matches are refused before touching storage.
//! - Rows are never updated; `reset_round` is the only delete path.

use crate::db::migrations::latest_version;
use crate::db::{schema_version, table_exists, table_has_column, DbError};
use crate::model::assignment::Assignment;
use crate::model::roster::{ParticipantId, RoundId};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ASSIGNMENT_SELECT_SQL: &str = "SELECT
    assignment_id,
    round_id,
    source_participant_id,
    target_participant_id,
    mission_id,
    created_at
FROM assignments";

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors from ledger reads and writes.
///
/// Commit races are not errors; see [`CommitOutcome::Conflict`].
#[derive(Debug)]
pub enum LedgerError {
    Db(DbError),
    /// Commit request pairs a participant with themselves.
    SelfMatch(ParticipantId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// In-process store lock was poisoned by a panicking writer.
    LockPoisoned(&'static str),
    InvalidData(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::SelfMatch(id) => write!(f, "participant cannot be assigned to themselves: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ledger repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "ledger repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "ledger repository requires column `{column}` in table `{table}`"
            ),
            Self::LockPoisoned(context) => write!(f, "ledger lock poisoned ({context})"),
            Self::InvalidData(message) => write!(f, "invalid persisted assignment data: {message}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Reason a conditional commit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitConflict {
    /// The source already holds a committed assignment in this round.
    SourceAlreadyAssigned,
    /// The target is already claimed by another source in this round.
    TargetAlreadyClaimed,
    /// Another writer held the store for longer than the busy timeout.
    StoreBusy,
}

impl CommitConflict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceAlreadyAssigned => "source_already_assigned",
            Self::TargetAlreadyClaimed => "target_already_claimed",
            Self::StoreBusy => "store_busy",
        }
    }
}

/// Result of [`LedgerRepository::try_commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Conflict(CommitConflict),
}

/// Durable record of committed assignments.
pub trait LedgerRepository {
    fn get_assignment(
        &self,
        round_id: RoundId,
        source_id: ParticipantId,
    ) -> LedgerResult<Option<Assignment>>;
    fn list_claimed_targets(&self, round_id: RoundId) -> LedgerResult<HashSet<ParticipantId>>;
    fn list_assignments(&self, round_id: RoundId) -> LedgerResult<Vec<Assignment>>;
    /// Inserts `assignment` unless its source is assigned or its target is
    /// claimed at commit time.
    fn try_commit(&self, assignment: &Assignment) -> LedgerResult<CommitOutcome>;
    /// Deletes every assignment of the round and returns the removed count.
    fn reset_round(&self, round_id: RoundId) -> LedgerResult<usize>;
}

impl<T: LedgerRepository + ?Sized> LedgerRepository for &T {
    fn get_assignment(
        &self,
        round_id: RoundId,
        source_id: ParticipantId,
    ) -> LedgerResult<Option<Assignment>> {
        (**self).get_assignment(round_id, source_id)
    }

    fn list_claimed_targets(&self, round_id: RoundId) -> LedgerResult<HashSet<ParticipantId>> {
        (**self).list_claimed_targets(round_id)
    }

    fn list_assignments(&self, round_id: RoundId) -> LedgerResult<Vec<Assignment>> {
        (**self).list_assignments(round_id)
    }

    fn try_commit(&self, assignment: &Assignment) -> LedgerResult<CommitOutcome> {
        (**self).try_commit(assignment)
    }

    fn reset_round(&self, round_id: RoundId) -> LedgerResult<usize> {
        (**self).reset_round(round_id)
    }
}

/// SQLite-backed ledger.
///
/// One instance per connection; concurrent callers each open their own
/// connection to the same database file.
pub struct SqliteLedgerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedgerRepository<'conn> {
    /// Wraps a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> LedgerResult<Self> {
        ensure_ledger_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl LedgerRepository for SqliteLedgerRepository<'_> {
    fn get_assignment(
        &self,
        round_id: RoundId,
        source_id: ParticipantId,
    ) -> LedgerResult<Option<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL}
             WHERE round_id = ?1
               AND source_participant_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![round_id.to_string(), source_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_assignment_row(row)?));
        }
        Ok(None)
    }

    fn list_claimed_targets(&self, round_id: RoundId) -> LedgerResult<HashSet<ParticipantId>> {
        let mut stmt = self.conn.prepare(
            "SELECT target_participant_id
             FROM assignments
             WHERE round_id = ?1;",
        )?;
        let mut rows = stmt.query([round_id.to_string()])?;
        let mut claimed = HashSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            claimed.insert(parse_uuid(&value, "assignments.target_participant_id")?);
        }
        Ok(claimed)
    }

    fn list_assignments(&self, round_id: RoundId) -> LedgerResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL}
             WHERE round_id = ?1
             ORDER BY created_at ASC, assignment_id ASC;"
        ))?;
        let mut rows = stmt.query([round_id.to_string()])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn try_commit(&self, assignment: &Assignment) -> LedgerResult<CommitOutcome> {
        if assignment.is_self_match() {
            return Err(LedgerError::SelfMatch(assignment.source_participant_id));
        }

        let tx = match Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate) {
            Ok(tx) => tx,
            Err(err) => return busy_as_conflict(err.into()),
        };

        if let Some(conflict) = find_conflict(&tx, assignment)? {
            return Ok(CommitOutcome::Conflict(conflict));
        }

        let inserted = tx.execute(
            "INSERT INTO assignments (
                assignment_id,
                round_id,
                source_participant_id,
                target_participant_id,
                mission_id,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                assignment.assignment_id.to_string(),
                assignment.round_id.to_string(),
                assignment.source_participant_id.to_string(),
                assignment.target_participant_id.to_string(),
                assignment.mission_id.to_string(),
                assignment.created_at_ms,
            ],
        );
        if let Err(err) = inserted {
            let err = DbError::from(err);
            if err.is_constraint_violation() {
                // Unique indexes back up the explicit checks above.
                if let Some(conflict) = find_conflict(&tx, assignment)? {
                    return Ok(CommitOutcome::Conflict(conflict));
                }
            }
            return busy_as_conflict(err);
        }

        if let Err(err) = tx.commit() {
            return busy_as_conflict(err.into());
        }
        Ok(CommitOutcome::Committed)
    }

    fn reset_round(&self, round_id: RoundId) -> LedgerResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM assignments WHERE round_id = ?1;",
            [round_id.to_string()],
        )?;
        info!(
            "event=round_reset module=repo status=ok round_id={} removed={}",
            round_id, removed
        );
        Ok(removed)
    }
}

fn find_conflict(conn: &Connection, assignment: &Assignment) -> LedgerResult<Option<CommitConflict>> {
    let source_taken: Option<i64> = conn
        .query_row(
            "SELECT 1
             FROM assignments
             WHERE round_id = ?1
               AND source_participant_id = ?2;",
            params![
                assignment.round_id.to_string(),
                assignment.source_participant_id.to_string(),
            ],
            |row| row.get(0),
        )
        .optional()?;
    if source_taken.is_some() {
        return Ok(Some(CommitConflict::SourceAlreadyAssigned));
    }

    let target_taken: Option<i64> = conn
        .query_row(
            "SELECT 1
             FROM assignments
             WHERE round_id = ?1
               AND target_participant_id = ?2;",
            params![
                assignment.round_id.to_string(),
                assignment.target_participant_id.to_string(),
            ],
            |row| row.get(0),
        )
        .optional()?;
    if target_taken.is_some() {
        return Ok(Some(CommitConflict::TargetAlreadyClaimed));
    }

    Ok(None)
}

fn busy_as_conflict(err: DbError) -> LedgerResult<CommitOutcome> {
    if err.is_busy() {
        warn!("event=commit_busy module=repo status=retryable error={}", err);
        return Ok(CommitOutcome::Conflict(CommitConflict::StoreBusy));
    }
    Err(err.into())
}

fn parse_assignment_row(row: &Row<'_>) -> LedgerResult<Assignment> {
    let assignment_id: String = row.get("assignment_id")?;
    let round_id: String = row.get("round_id")?;
    let source: String = row.get("source_participant_id")?;
    let target: String = row.get("target_participant_id")?;
    let mission_id: String = row.get("mission_id")?;

    let assignment = Assignment {
        assignment_id: parse_uuid(&assignment_id, "assignments.assignment_id")?,
        round_id: parse_uuid(&round_id, "assignments.round_id")?,
        source_participant_id: parse_uuid(&source, "assignments.source_participant_id")?,
        target_participant_id: parse_uuid(&target, "assignments.target_participant_id")?,
        mission_id: parse_uuid(&mission_id, "assignments.mission_id")?,
        created_at_ms: row.get("created_at")?,
    };
    if assignment.is_self_match() {
        return Err(LedgerError::InvalidData(format!(
            "self-match stored for participant {source}"
        )));
    }
    Ok(assignment)
}

fn parse_uuid(value: &str, column: &'static str) -> LedgerResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| LedgerError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_ledger_connection_ready(conn: &Connection) -> LedgerResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(LedgerError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "assignments")? {
        return Err(LedgerError::MissingRequiredTable("assignments"));
    }

    for column in [
        "assignment_id",
        "round_id",
        "source_participant_id",
        "target_participant_id",
        "mission_id",
        "created_at",
    ] {
        if !table_has_column(conn, "assignments", column)? {
            return Err(LedgerError::MissingRequiredColumn {
                table: "assignments",
                column,
            });
        }
    }

    Ok(())
}
