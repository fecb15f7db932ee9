//! Positional argument parsing for the admin CLI.

use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const USAGE: &str = "usage: manitto_cli <command> [args]

commands:
  version
  init
  add-round <name>
  add-participant <round_id> <display_name> [image_ref]
  add-mission <round_id> <content>
  allocate <round_id> <participant_id>
  mine <round_id> <participant_id>
  status <round_id>
  reset <round_id>

environment:
  MANITTO_DB_PATH    database file (default: <tmp>/manitto.db)
  MANITTO_LOG_DIR    absolute log directory; logging is off when unset
  MANITTO_LOG_LEVEL  trace|debug|info|warn|error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Version,
    Init,
    AddRound {
        name: String,
    },
    AddParticipant {
        round_id: Uuid,
        display_name: String,
        image_ref: Option<String>,
    },
    AddMission {
        round_id: Uuid,
        content: String,
    },
    Allocate {
        round_id: Uuid,
        participant_id: Uuid,
    },
    Mine {
        round_id: Uuid,
        participant_id: Uuid,
    },
    Status {
        round_id: Uuid,
    },
    Reset {
        round_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    MissingCommand,
    UnknownCommand(String),
    MissingArgument(&'static str),
    UnexpectedArgument(String),
    InvalidId { field: &'static str, value: String },
}

impl Display for UsageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCommand => write!(f, "missing command"),
            Self::UnknownCommand(name) => write!(f, "unknown command `{name}`"),
            Self::MissingArgument(name) => write!(f, "missing argument <{name}>"),
            Self::UnexpectedArgument(value) => write!(f, "unexpected argument `{value}`"),
            Self::InvalidId { field, value } => {
                write!(f, "<{field}> must be a UUID, got `{value}`")
            }
        }
    }
}

impl std::error::Error for UsageError {}

/// Parses arguments after the program name.
pub fn parse(args: &[String]) -> Result<Command, UsageError> {
    let mut args = Args::new(args);
    let name = args.next().ok_or(UsageError::MissingCommand)?;

    let command = match name {
        "version" => Command::Version,
        "init" => Command::Init,
        "add-round" => Command::AddRound {
            name: args.required("name")?.to_string(),
        },
        "add-participant" => Command::AddParticipant {
            round_id: args.id("round_id")?,
            display_name: args.required("display_name")?.to_string(),
            image_ref: args.next().map(str::to_string),
        },
        "add-mission" => Command::AddMission {
            round_id: args.id("round_id")?,
            content: args.required("content")?.to_string(),
        },
        "allocate" => Command::Allocate {
            round_id: args.id("round_id")?,
            participant_id: args.id("participant_id")?,
        },
        "mine" => Command::Mine {
            round_id: args.id("round_id")?,
            participant_id: args.id("participant_id")?,
        },
        "status" => Command::Status {
            round_id: args.id("round_id")?,
        },
        "reset" => Command::Reset {
            round_id: args.id("round_id")?,
        },
        other => return Err(UsageError::UnknownCommand(other.to_string())),
    };

    match args.next() {
        Some(extra) => Err(UsageError::UnexpectedArgument(extra.to_string())),
        None => Ok(command),
    }
}

struct Args<'a> {
    inner: std::slice::Iter<'a, String>,
}

impl<'a> Args<'a> {
    fn new(args: &'a [String]) -> Self {
        Self { inner: args.iter() }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.inner.next().map(String::as_str)
    }

    fn required(&mut self, field: &'static str) -> Result<&'a str, UsageError> {
        self.next().ok_or(UsageError::MissingArgument(field))
    }

    fn id(&mut self, field: &'static str) -> Result<Uuid, UsageError> {
        let raw = self.required(field)?;
        Uuid::parse_str(raw.trim()).map_err(|_| UsageError::InvalidId {
            field,
            value: raw.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Command, UsageError};
    use uuid::Uuid;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_allocate_with_two_ids() {
        let round_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();
        let command = parse(&args(&[
            "allocate",
            &round_id.to_string(),
            &participant_id.to_string(),
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Allocate {
                round_id,
                participant_id
            }
        );
    }

    #[test]
    fn image_ref_is_optional_for_add_participant() {
        let round_id = Uuid::new_v4();
        let without = parse(&args(&["add-participant", &round_id.to_string(), "Alice"])).unwrap();
        assert!(matches!(
            without,
            Command::AddParticipant { image_ref: None, .. }
        ));

        let with = parse(&args(&[
            "add-participant",
            &round_id.to_string(),
            "Alice",
            "alice.png",
        ]))
        .unwrap();
        assert!(matches!(
            with,
            Command::AddParticipant { image_ref: Some(ref image), .. } if image == "alice.png"
        ));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse(&[]).unwrap_err(), UsageError::MissingCommand);
        assert_eq!(
            parse(&args(&["shuffle"])).unwrap_err(),
            UsageError::UnknownCommand("shuffle".to_string())
        );
        assert_eq!(
            parse(&args(&["status"])).unwrap_err(),
            UsageError::MissingArgument("round_id")
        );
        assert!(matches!(
            parse(&args(&["reset", "not-a-uuid"])).unwrap_err(),
            UsageError::InvalidId { field: "round_id", .. }
        ));
        assert_eq!(
            parse(&args(&["version", "extra"])).unwrap_err(),
            UsageError::UnexpectedArgument("extra".to_string())
        );
    }
}
