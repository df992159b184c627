use quicknote_core::db::migrations::latest_version;
use quicknote_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "documents");
    assert_table_exists(&conn, "local_session");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quicknote.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "documents");
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
fn open_failure_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("quicknote.sqlite3");

    let err = open_db(&path).unwrap_err();

    match &err {
        DbError::Open { path: failed, .. } => assert_eq!(failed, &path),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("quicknote.sqlite3"));
}

#[test]
fn schema_rejects_invalid_rows() {
    let conn = open_db_in_memory().unwrap();

    let bad_flag = conn.execute(
        "INSERT INTO documents (id, collection, data, created_at, updated_at, is_deleted)
         VALUES ('d1', 'notes', '{}', 0, 0, 2);",
        [],
    );
    assert!(bad_flag.is_err());

    let bad_slot = conn.execute(
        "INSERT INTO local_session (slot, user_id, email, created_at)
         VALUES (2, 'u1', 'a@b.com', 0);",
        [],
    );
    assert!(bad_slot.is_err());
}

#[test]
fn version_one_documents_gain_empty_owner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quicknote.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
        .unwrap();
    conn.execute_batch(
        "INSERT INTO documents (id, collection, data, created_at, updated_at)
         VALUES ('d1', 'notes', '{}', 0, 0);
         PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let upgraded = open_db(&path).unwrap();

    assert_eq!(schema_version(&upgraded), latest_version());
    let owner: String = upgraded
        .query_row("SELECT owner_id FROM documents WHERE id = 'd1';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(owner, "");
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
