//! Round roster repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the registry reads the allocation service depends on.
//! - Provide the administrative inserts that populate a round.
//!
//! # Invariants
//! - Participant listing is deterministic: `display_name ASC, participant_id ASC`.
//! - Mission listing follows creation order: `created_at ASC, rowid ASC`,
//!   with `created_at` stamped in epoch milliseconds on insert.
//! - Writes validate text through the model constructors first.

use crate::db::migrations::latest_version;
use crate::db::{schema_version, table_exists, table_has_column, DbError};
use crate::model::assignment::now_epoch_ms;
use crate::model::roster::{Mission, Participant, Round, RoundId, RosterValidationError};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RosterResult<T> = Result<T, RosterError>;

/// Errors from roster reads and administrative writes.
#[derive(Debug)]
pub enum RosterError {
    Validation(RosterValidationError),
    Db(DbError),
    /// Round id is unknown to the registry.
    RoundNotFound(RoundId),
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

impl Display for RosterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::RoundNotFound(id) => write!(f, "round not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "roster repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "roster repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "roster repository requires column `{column}` in table `{table}`"
            ),
            Self::LockPoisoned(context) => write!(f, "roster store lock poisoned ({context})"),
            Self::InvalidData(message) => write!(f, "invalid persisted roster data: {message}"),
        }
    }
}

impl Error for RosterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RosterValidationError> for RosterError {
    fn from(value: RosterValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RosterError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RosterError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Registry of rounds, participants and missions.
pub trait RosterRepository {
    fn get_round(&self, round_id: RoundId) -> RosterResult<Option<Round>>;
    fn list_participants(&self, round_id: RoundId) -> RosterResult<Vec<Participant>>;
    fn list_missions(&self, round_id: RoundId) -> RosterResult<Vec<Mission>>;
    fn create_round(&self, name: &str) -> RosterResult<Round>;
    fn add_participant(
        &self,
        round_id: RoundId,
        display_name: &str,
        image_ref: Option<&str>,
    ) -> RosterResult<Participant>;
    fn add_mission(&self, round_id: RoundId, content: &str) -> RosterResult<Mission>;
}

impl<T: RosterRepository + ?Sized> RosterRepository for &T {
    fn get_round(&self, round_id: RoundId) -> RosterResult<Option<Round>> {
        (**self).get_round(round_id)
    }

    fn list_participants(&self, round_id: RoundId) -> RosterResult<Vec<Participant>> {
        (**self).list_participants(round_id)
    }

    fn list_missions(&self, round_id: RoundId) -> RosterResult<Vec<Mission>> {
        (**self).list_missions(round_id)
    }

    fn create_round(&self, name: &str) -> RosterResult<Round> {
        (**self).create_round(name)
    }

    fn add_participant(
        &self,
        round_id: RoundId,
        display_name: &str,
        image_ref: Option<&str>,
    ) -> RosterResult<Participant> {
        (**self).add_participant(round_id, display_name, image_ref)
    }

    fn add_mission(&self, round_id: RoundId, content: &str) -> RosterResult<Mission> {
        (**self).add_mission(round_id, content)
    }
}

/// SQLite-backed roster repository.
pub struct SqliteRosterRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRosterRepository<'conn> {
    /// Wraps a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` on schema drift.
    pub fn try_new(conn: &'conn Connection) -> RosterResult<Self> {
        ensure_roster_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl RosterRepository for SqliteRosterRepository<'_> {
    fn get_round(&self, round_id: RoundId) -> RosterResult<Option<Round>> {
        let row = self
            .conn
            .query_row(
                "SELECT round_id, name FROM rounds WHERE round_id = ?1;",
                [round_id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((id, name)) => Ok(Some(Round {
                round_id: parse_uuid(&id, "rounds.round_id")?,
                name,
            })),
            None => Ok(None),
        }
    }

    fn list_participants(&self, round_id: RoundId) -> RosterResult<Vec<Participant>> {
        let mut stmt = self.conn.prepare(
            "SELECT participant_id, round_id, display_name, image_ref
             FROM participants
             WHERE round_id = ?1
             ORDER BY display_name ASC, participant_id ASC;",
        )?;
        let mut rows = stmt.query([round_id.to_string()])?;
        let mut participants = Vec::new();
        while let Some(row) = rows.next()? {
            participants.push(parse_participant_row(row)?);
        }
        Ok(participants)
    }

    fn list_missions(&self, round_id: RoundId) -> RosterResult<Vec<Mission>> {
        let mut stmt = self.conn.prepare(
            "SELECT mission_id, round_id, content
             FROM missions
             WHERE round_id = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([round_id.to_string()])?;
        let mut missions = Vec::new();
        while let Some(row) = rows.next()? {
            missions.push(parse_mission_row(row)?);
        }
        Ok(missions)
    }

    fn create_round(&self, name: &str) -> RosterResult<Round> {
        let round = Round::new(name)?;
        self.conn.execute(
            "INSERT INTO rounds (round_id, name) VALUES (?1, ?2);",
            params![round.round_id.to_string(), round.name.as_str()],
        )?;
        info!(
            "event=round_create module=repo status=ok round_id={}",
            round.round_id
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
        self.ensure_round_exists(round_id)?;
        self.conn.execute(
            "INSERT INTO participants (participant_id, round_id, display_name, image_ref)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                participant.participant_id.to_string(),
                round_id.to_string(),
                participant.display_name.as_str(),
                participant.image_ref.as_deref(),
            ],
        )?;
        Ok(participant)
    }

    fn add_mission(&self, round_id: RoundId, content: &str) -> RosterResult<Mission> {
        let mission = Mission::new(round_id, content)?;
        self.ensure_round_exists(round_id)?;
        self.conn.execute(
            "INSERT INTO missions (mission_id, round_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                mission.mission_id.to_string(),
                round_id.to_string(),
                mission.content.as_str(),
                now_epoch_ms(),
            ],
        )?;
        Ok(mission)
    }
}

impl SqliteRosterRepository<'_> {
    fn ensure_round_exists(&self, round_id: RoundId) -> RosterResult<()> {
        if self.get_round(round_id)?.is_none() {
            return Err(RosterError::RoundNotFound(round_id));
        }
        Ok(())
    }
}

fn parse_participant_row(row: &Row<'_>) -> RosterResult<Participant> {
    let participant_id: String = row.get("participant_id")?;
    let round_id: String = row.get("round_id")?;
    Ok(Participant {
        participant_id: parse_uuid(&participant_id, "participants.participant_id")?,
        round_id: parse_uuid(&round_id, "participants.round_id")?,
        display_name: row.get("display_name")?,
        image_ref: row.get("image_ref")?,
    })
}

fn parse_mission_row(row: &Row<'_>) -> RosterResult<Mission> {
    let mission_id: String = row.get("mission_id")?;
    let round_id: String = row.get("round_id")?;
    Ok(Mission {
        mission_id: parse_uuid(&mission_id, "missions.mission_id")?,
        round_id: parse_uuid(&round_id, "missions.round_id")?,
        content: row.get("content")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> RosterResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RosterError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_roster_connection_ready(conn: &Connection) -> RosterResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(RosterError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 3] = [
        ("rounds", &["round_id", "name"]),
        (
            "participants",
            &["participant_id", "round_id", "display_name", "image_ref"],
        ),
        ("missions", &["mission_id", "round_id", "content", "created_at"]),
    ];
    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(RosterError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RosterError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}
