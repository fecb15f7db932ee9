use manitto_core::db::migrations::latest_version;
use manitto_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;
use std::sync::Barrier;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "rounds");
    assert_table_exists(&conn, "participants");
    assert_table_exists(&conn, "missions");
    assert_table_exists(&conn, "assignments");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manitto.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "assignments");
}

#[test]
fn file_databases_use_wal_journal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("wal.db")).unwrap();

    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn concurrent_first_opens_migrate_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    Connection::open(&path)
        .unwrap()
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .unwrap();
    let barrier = Barrier::new(6);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    open_db(&path).map(|conn| schema_version(&conn))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), latest_version());
        }
    });
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn schema_rejects_self_match_and_duplicate_rows() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO rounds (round_id, name) VALUES ('r', 'round');
         INSERT INTO participants (participant_id, round_id, display_name) VALUES
            ('a', 'r', 'A'), ('b', 'r', 'B'), ('c', 'r', 'C');
         INSERT INTO missions (mission_id, round_id, content) VALUES ('m', 'r', 'sing');
         INSERT INTO assignments VALUES ('x1', 'r', 'a', 'b', 'm', 1);",
    )
    .unwrap();

    for sql in [
        "INSERT INTO assignments VALUES ('x2', 'r', 'c', 'c', 'm', 2);",
        "INSERT INTO assignments VALUES ('x3', 'r', 'a', 'c', 'm', 3);",
        "INSERT INTO assignments VALUES ('x4', 'r', 'c', 'b', 'm', 4);",
    ] {
        let err = conn.execute(sql, []).unwrap_err();
        assert!(
            DbError::from(err).is_constraint_violation(),
            "expected constraint violation for `{sql}`"
        );
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
