use manitto_core::db::{open_db, open_db_in_memory, open_db_with_busy_timeout};
use manitto_core::{
    AllocationConfig, AllocationError, AllocationOutcome, AllocationService, Assignment,
    CommitOutcome, LedgerRepository, Participant, RosterRepository, RoundService,
    SqliteLedgerRepository, SqliteRosterRepository,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

const MISSIONS: [&str; 2] = ["sing a song", "write a letter"];

fn seed_round(conn: &Connection, names: &[&str]) -> (Uuid, Vec<Participant>) {
    let roster = SqliteRosterRepository::try_new(conn).unwrap();
    let round = roster.create_round("year-end party").unwrap();
    let participants = names
        .iter()
        .map(|name| roster.add_participant(round.round_id, name, None).unwrap())
        .collect();
    for mission in MISSIONS {
        roster.add_mission(round.round_id, mission).unwrap();
    }
    (round.round_id, participants)
}

fn service(conn: &Connection) -> AllocationService<SqliteRosterRepository<'_>, SqliteLedgerRepository<'_>> {
    AllocationService::new(
        SqliteRosterRepository::try_new(conn).unwrap(),
        SqliteLedgerRepository::try_new(conn).unwrap(),
    )
}

fn assignments(conn: &Connection, round_id: Uuid) -> Vec<Assignment> {
    SqliteLedgerRepository::try_new(conn)
        .unwrap()
        .list_assignments(round_id)
        .unwrap()
}

#[test]
fn three_person_round_follows_claim_rules() {
    let conn = open_db_in_memory().unwrap();
    let (round_id, people) = seed_round(&conn, &["A", "B", "C"]);
    let service = service(&conn);
    let ids: Vec<Uuid> = people.iter().map(|p| p.participant_id).collect();

    let first = service.allocate(round_id, ids[0]).unwrap();
    let first_target = first.allocated().unwrap().clone();
    assert!([ids[1], ids[2]].contains(&first_target.target_participant_id));
    assert!(MISSIONS.contains(&first_target.mission_content.as_str()));

    let second = service.allocate(round_id, ids[1]).unwrap();
    let second_target = second.allocated().unwrap();
    assert_ne!(second_target.target_participant_id, ids[1]);
    assert_ne!(
        second_target.target_participant_id,
        first_target.target_participant_id
    );

    let third = service.allocate(round_id, ids[2]).unwrap();
    let claimed: HashSet<Uuid> = [
        first_target.target_participant_id,
        second_target.target_participant_id,
    ]
    .into_iter()
    .collect();
    let remaining: Vec<Uuid> = ids.iter().copied().filter(|id| !claimed.contains(id)).collect();
    assert_eq!(remaining.len(), 1);

    match third {
        AllocationOutcome::Allocated(target) => {
            assert_eq!(target.target_participant_id, remaining[0]);
            assert_ne!(target.target_participant_id, ids[2]);
            assert_eq!(assignments(&conn, round_id).len(), 3);
        }
        AllocationOutcome::NoTargetsAvailable => {
            assert_eq!(remaining[0], ids[2]);
            assert_eq!(assignments(&conn, round_id).len(), 2);
        }
    }
}

#[test]
fn repeated_allocate_returns_identical_result_without_new_rows() {
    let conn = open_db_in_memory().unwrap();
    let (round_id, people) = seed_round(&conn, &["A", "B", "C", "D"]);
    let service = service(&conn);
    let requester = people[2].participant_id;

    let first = service.allocate(round_id, requester).unwrap();
    for _ in 0..5 {
        assert_eq!(service.allocate(round_id, requester).unwrap(), first);
    }
    assert_eq!(assignments(&conn, round_id).len(), 1);
}

#[test]
fn allocation_result_carries_target_display_data() {
    let conn = open_db_in_memory().unwrap();
    let roster = SqliteRosterRepository::try_new(&conn).unwrap();
    let round = roster.create_round("pair").unwrap();
    let giver = roster.add_participant(round.round_id, "Giver", None).unwrap();
    let receiver = roster
        .add_participant(round.round_id, "Receiver", Some("https://img/receiver.png"))
        .unwrap();
    let mission = roster.add_mission(round.round_id, "bring coffee").unwrap();

    let outcome = service(&conn)
        .allocate(round.round_id, giver.participant_id)
        .unwrap();
    let target = outcome.allocated().unwrap();
    assert_eq!(target.target_participant_id, receiver.participant_id);
    assert_eq!(target.target_display_name, "Receiver");
    assert_eq!(
        target.target_image_ref.as_deref(),
        Some("https://img/receiver.png")
    );
    assert_eq!(target.mission_id, mission.mission_id);
    assert_eq!(target.mission_content, "bring coffee");
}

#[test]
fn last_requester_with_only_self_unclaimed_gets_no_targets() {
    let conn = open_db_in_memory().unwrap();
    let (round_id, people) = seed_round(&conn, &["A", "B", "C"]);
    let roster = SqliteRosterRepository::try_new(&conn).unwrap();
    let ledger = SqliteLedgerRepository::try_new(&conn).unwrap();
    let mission_id = roster.list_missions(round_id).unwrap()[0].mission_id;
    let [a, b, c] = [
        people[0].participant_id,
        people[1].participant_id,
        people[2].participant_id,
    ];

    for (source, target) in [(a, b), (b, a)] {
        let assignment = Assignment::new(round_id, source, target, mission_id);
        assert_eq!(ledger.try_commit(&assignment).unwrap(), CommitOutcome::Committed);
    }

    let outcome = service(&conn).allocate(round_id, c).unwrap();
    assert_eq!(outcome, AllocationOutcome::NoTargetsAvailable);
    assert_eq!(assignments(&conn, round_id).len(), 2);
    assert!(service(&conn).current_assignment(round_id, c).unwrap().is_none());
}

#[test]
fn unknown_requester_or_round_is_not_found_and_leaves_ledger_untouched() {
    let conn = open_db_in_memory().unwrap();
    let (round_id, _) = seed_round(&conn, &["A", "B"]);
    let (other_round, outsiders) = seed_round(&conn, &["X", "Y"]);
    let service = service(&conn);

    let err = service
        .allocate(round_id, outsiders[0].participant_id)
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        err,
        AllocationError::ParticipantNotFound { round_id: r, participant_id: p }
            if r == round_id && p == outsiders[0].participant_id
    ));

    let missing_round = Uuid::new_v4();
    let err = service
        .allocate(missing_round, outsiders[0].participant_id)
        .unwrap_err();
    assert!(matches!(err, AllocationError::RoundNotFound(id) if id == missing_round));

    assert!(assignments(&conn, round_id).is_empty());
    assert!(assignments(&conn, other_round).is_empty());
}

#[test]
fn current_assignment_reads_without_allocating() {
    let conn = open_db_in_memory().unwrap();
    let (round_id, people) = seed_round(&conn, &["A", "B", "C"]);
    let service = service(&conn);
    let requester = people[0].participant_id;

    assert!(service.current_assignment(round_id, requester).unwrap().is_none());
    assert!(assignments(&conn, round_id).is_empty());

    let outcome = service.allocate(round_id, requester).unwrap();
    let viewed = service.current_assignment(round_id, requester).unwrap();
    assert_eq!(viewed.as_ref(), outcome.allocated());
}

#[test]
fn reset_round_lets_everyone_allocate_again() {
    let conn = open_db_in_memory().unwrap();
    let (round_id, people) = seed_round(&conn, &["A", "B"]);
    let service = service(&conn);
    let [a, b] = [people[0].participant_id, people[1].participant_id];

    let before_a = service.allocate(round_id, a).unwrap();
    let before_b = service.allocate(round_id, b).unwrap();
    assert_eq!(before_a.allocated().unwrap().target_participant_id, b);
    assert_eq!(before_b.allocated().unwrap().target_participant_id, a);

    let rounds = RoundService::new(
        SqliteRosterRepository::try_new(&conn).unwrap(),
        SqliteLedgerRepository::try_new(&conn).unwrap(),
    );
    assert!(rounds.allocation_status(round_id).unwrap().is_complete());
    assert_eq!(rounds.reset_round(round_id).unwrap(), 2);

    let status = rounds.allocation_status(round_id).unwrap();
    assert_eq!(status.assigned_count, 0);
    assert!(status.participants.iter().all(|p| !p.has_allocated));
    assert!(service.current_assignment(round_id, a).unwrap().is_none());

    let after_a = service.allocate(round_id, a).unwrap();
    let after_b = service.allocate(round_id, b).unwrap();
    assert_ne!(
        after_a.allocated().unwrap().assignment_id,
        before_a.allocated().unwrap().assignment_id
    );
    assert_eq!(after_a.allocated().unwrap().target_participant_id, b);
    assert_eq!(after_b.allocated().unwrap().target_participant_id, a);
}

#[test]
fn rounds_do_not_share_claims() {
    let conn = open_db_in_memory().unwrap();
    let (first_round, first_people) = seed_round(&conn, &["A", "B"]);
    let (second_round, second_people) = seed_round(&conn, &["A", "B"]);
    let service = service(&conn);

    for (round_id, people) in [(first_round, &first_people), (second_round, &second_people)] {
        for person in people.iter() {
            let outcome = service.allocate(round_id, person.participant_id).unwrap();
            assert!(outcome.allocated().is_some());
        }
        assert_eq!(assignments(&conn, round_id).len(), 2);
    }
}

#[test]
fn locked_store_exhausts_retries_as_transient_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let conn = open_db_with_busy_timeout(&path, Duration::from_millis(50)).unwrap();
    let (round_id, people) = seed_round(&conn, &["A", "B", "C"]);
    let service = AllocationService::with_config(
        SqliteRosterRepository::try_new(&conn).unwrap(),
        SqliteLedgerRepository::try_new(&conn).unwrap(),
        AllocationConfig { max_attempts: 2 },
    );

    let holder = open_db(&path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();
    let err = service
        .allocate(round_id, people[0].participant_id)
        .unwrap_err();
    assert!(matches!(err, AllocationError::TransientConflict { attempts: 2 }));
    assert!(err.is_retryable());
    holder.execute_batch("ROLLBACK;").unwrap();

    let outcome = service.allocate(round_id, people[0].participant_id).unwrap();
    assert!(outcome.allocated().is_some());
    assert_eq!(assignments(&conn, round_id).len(), 1);
}
