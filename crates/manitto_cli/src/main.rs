//! Admin CLI for manitto rounds.
//!
//! # Responsibility
//! - Seed rounds, participants and missions into a local database.
//! - Run allocation requests and inspect round progress from a shell.
//!
//! Exit codes: 0 success, 1 failure, 2 usage error, 3 no targets available.

mod command;

use command::{Command, USAGE};
use log::info;
use manitto_core::db::open_db;
use manitto_core::{
    core_version, default_log_level, init_logging, AllocatedTarget, AllocationOutcome,
    AllocationService, RosterRepository, RoundService, SqliteLedgerRepository,
    SqliteRosterRepository,
};
use rusqlite::Connection;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

const DB_FILE_NAME: &str = "manitto.db";

type CliResult<T> = Result<T, Box<dyn Error>>;

enum Finished {
    Done,
    NoTargetsAvailable,
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match command::parse(&args) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("error: {err}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = init_logging_from_env() {
        eprintln!("warning: logging disabled: {err}");
    }

    match run(command) {
        Ok(Finished::Done) => ExitCode::SUCCESS,
        Ok(Finished::NoTargetsAvailable) => ExitCode::from(3),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(command: Command) -> CliResult<Finished> {
    if command == Command::Version {
        println!("manitto_core version={}", core_version());
        return Ok(Finished::Done);
    }

    let db_path = resolve_db_path();
    let conn = open_db(&db_path)?;
    info!(
        "event=cli_command module=cli status=start db_path={}",
        db_path.display()
    );

    match command {
        Command::Version => {}
        Command::Init => println!("db={} ready", db_path.display()),
        Command::AddRound { name } => {
            let round = SqliteRosterRepository::try_new(&conn)?.create_round(&name)?;
            println!("round_id={}", round.round_id);
        }
        Command::AddParticipant {
            round_id,
            display_name,
            image_ref,
        } => {
            let participant = SqliteRosterRepository::try_new(&conn)?.add_participant(
                round_id,
                &display_name,
                image_ref.as_deref(),
            )?;
            println!("participant_id={}", participant.participant_id);
        }
        Command::AddMission { round_id, content } => {
            let mission = SqliteRosterRepository::try_new(&conn)?.add_mission(round_id, &content)?;
            println!("mission_id={}", mission.mission_id);
        }
        Command::Allocate {
            round_id,
            participant_id,
        } => {
            let service = allocation_service(&conn)?;
            match service.allocate(round_id, participant_id)? {
                AllocationOutcome::Allocated(target) => print_target(&target),
                AllocationOutcome::NoTargetsAvailable => {
                    println!("no targets available; ask the organizer to reset the round");
                    return Ok(Finished::NoTargetsAvailable);
                }
            }
        }
        Command::Mine {
            round_id,
            participant_id,
        } => match allocation_service(&conn)?.current_assignment(round_id, participant_id)? {
            Some(target) => print_target(&target),
            None => println!("no assignment yet"),
        },
        Command::Status { round_id } => {
            let rounds = round_service(&conn)?;
            let status = rounds.allocation_status(round_id)?;
            println!(
                "round={} assigned={}/{}",
                status.round.name, status.assigned_count, status.participant_count
            );
            for participant in &status.participants {
                let marker = if participant.has_allocated { "x" } else { " " };
                println!(
                    "[{marker}] {} {}",
                    participant.participant_id, participant.display_name
                );
            }
            for summary in rounds.list_assignment_summaries(round_id)? {
                println!(
                    "{} -> {} : {}",
                    summary.source_display_name,
                    summary.target_display_name,
                    summary.mission_content
                );
            }
        }
        Command::Reset { round_id } => {
            let removed = round_service(&conn)?.reset_round(round_id)?;
            println!("removed={removed}");
        }
    }

    Ok(Finished::Done)
}

fn allocation_service(
    conn: &Connection,
) -> CliResult<AllocationService<SqliteRosterRepository<'_>, SqliteLedgerRepository<'_>>> {
    Ok(AllocationService::new(
        SqliteRosterRepository::try_new(conn)?,
        SqliteLedgerRepository::try_new(conn)?,
    ))
}

fn round_service(
    conn: &Connection,
) -> CliResult<RoundService<SqliteRosterRepository<'_>, SqliteLedgerRepository<'_>>> {
    Ok(RoundService::new(
        SqliteRosterRepository::try_new(conn)?,
        SqliteLedgerRepository::try_new(conn)?,
    ))
}

fn print_target(target: &AllocatedTarget) {
    println!("target={}", target.target_display_name);
    if let Some(image_ref) = &target.target_image_ref {
        println!("image={image_ref}");
    }
    println!("mission={}", target.mission_content);
}

fn resolve_db_path() -> PathBuf {
    env_value("MANITTO_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join(DB_FILE_NAME))
}

fn init_logging_from_env() -> CliResult<()> {
    let Some(log_dir) = env_value("MANITTO_LOG_DIR") else {
        return Ok(());
    };
    let level = env_value("MANITTO_LOG_LEVEL").unwrap_or_else(|| default_log_level().to_string());
    init_logging(&level, &log_dir)?;
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}
