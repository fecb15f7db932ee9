//! Round roster model: rounds, participants and missions.
//!
//! # Responsibility
//! - Define the records supplied by round administration.
//! - Normalize and validate user-entered text before persistence.
//!
//! # Invariants
//! - Participant and mission records belong to exactly one round.
//! - Display names and mission contents are non-blank after trim.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable round identifier.
pub type RoundId = Uuid;
/// Stable participant identifier, unique across rounds.
pub type ParticipantId = Uuid;
/// Stable mission identifier.
pub type MissionId = Uuid;

/// One instance of the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: RoundId,
    /// Human-readable label shown to administrators.
    pub name: String,
}

/// A member of a round who can give and receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub round_id: RoundId,
    pub display_name: String,
    /// Opaque reference to an uploaded picture, if any.
    pub image_ref: Option<String>,
}

/// A task handed out together with a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: MissionId,
    pub round_id: RoundId,
    pub content: String,
}

/// Validation errors for administratively entered roster text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterValidationError {
    BlankRoundName,
    BlankDisplayName,
    BlankMissionContent,
    BlankImageRef,
}

impl Display for RosterValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankRoundName => write!(f, "round name must not be blank"),
            Self::BlankDisplayName => write!(f, "participant display name must not be blank"),
            Self::BlankMissionContent => write!(f, "mission content must not be blank"),
            Self::BlankImageRef => write!(f, "image reference must not be blank when provided"),
        }
    }
}

impl Error for RosterValidationError {}

impl Round {
    /// Creates a round with a generated id.
    pub fn new(name: impl Into<String>) -> Result<Self, RosterValidationError> {
        let name = normalize_text(name.into(), RosterValidationError::BlankRoundName)?;
        Ok(Self {
            round_id: Uuid::new_v4(),
            name,
        })
    }
}

impl Participant {
    /// Creates a participant of `round_id` with a generated id.
    pub fn new(
        round_id: RoundId,
        display_name: impl Into<String>,
        image_ref: Option<String>,
    ) -> Result<Self, RosterValidationError> {
        let display_name =
            normalize_text(display_name.into(), RosterValidationError::BlankDisplayName)?;
        let image_ref = image_ref
            .map(|value| normalize_text(value, RosterValidationError::BlankImageRef))
            .transpose()?;
        Ok(Self {
            participant_id: Uuid::new_v4(),
            round_id,
            display_name,
            image_ref,
        })
    }
}

impl Mission {
    /// Creates a mission of `round_id` with a generated id.
    pub fn new(round_id: RoundId, content: impl Into<String>) -> Result<Self, RosterValidationError> {
        let content = normalize_text(content.into(), RosterValidationError::BlankMissionContent)?;
        Ok(Self {
            mission_id: Uuid::new_v4(),
            round_id,
            content,
        })
    }
}

fn normalize_text(
    value: String,
    blank_error: RosterValidationError,
) -> Result<String, RosterValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(blank_error);
    }
    Ok(trimmed.to_string())
}
