use rusqlite::Connection;
use scheduler_core::db::migrations::latest_version;
use scheduler_core::db::open_db_in_memory;
use scheduler_core::{
    Event, EventDraft, EventRepository, EventValidationError, Handle, RepoError,
    SqliteEventRepository,
};
use uuid::Uuid;

fn draft(subject: &str) -> EventDraft {
    EventDraft {
        subject: subject.to_string(),
        description: Some("quarterly planning".to_string()),
        location: "Room 3".to_string(),
        start_ms: 1_700_000_000_000,
        end_ms: Some(1_700_003_600_000),
        is_full_day: false,
        members: Vec::new(),
    }
}

fn event(creator: &str, members: &[&str], subject: &str) -> Event {
    Event::new(
        Handle::new(creator),
        members.iter().map(Handle::new).collect(),
        &draft(subject),
    )
}

#[test]
fn insert_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let stored = event("carl@x.com", &["anna@x.com", "bo@x.com"], "planning");
    let id = repo.insert_event(&stored).unwrap();

    let loaded = repo.get_event(id).unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(loaded.version, 1);
    assert!(loaded.declined.is_empty());
}

#[test]
fn get_missing_event_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    assert!(repo.get_event(Uuid::new_v4()).unwrap().is_none());
}

#[test]
fn update_bumps_stored_version() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let mut stored = event("carl@x.com", &["anna@x.com"], "draft");
    repo.insert_event(&stored).unwrap();

    stored.subject = "final".to_string();
    stored.declined.insert(Handle::new("anna@x.com"));
    repo.update_event(&stored).unwrap();

    let loaded = repo.get_event(stored.uuid).unwrap().unwrap();
    assert_eq!(loaded.subject, "final");
    assert!(loaded.declined.contains(&Handle::new("anna@x.com")));
    assert_eq!(loaded.version, 2);
}

#[test]
fn stale_update_fails_with_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let stored = event("carl@x.com", &["anna@x.com"], "planning");
    repo.insert_event(&stored).unwrap();

    // Two writers read version 1.
    let mut writer_a = repo.get_event(stored.uuid).unwrap().unwrap();
    let mut writer_b = repo.get_event(stored.uuid).unwrap().unwrap();

    writer_a.subject = "writer a".to_string();
    repo.update_event(&writer_a).unwrap();

    writer_b.subject = "writer b".to_string();
    let err = repo.update_event(&writer_b).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(id) if id == stored.uuid));

    // Writer A's change must not be overwritten.
    let loaded = repo.get_event(stored.uuid).unwrap().unwrap();
    assert_eq!(loaded.subject, "writer a");
}

#[test]
fn update_missing_event_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let stored = event("carl@x.com", &[], "missing");
    let err = repo.update_event(&stored).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == stored.uuid));
}

#[test]
fn remove_deletes_permanently() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let stored = event("carl@x.com", &[], "short lived");
    repo.insert_event(&stored).unwrap();

    repo.remove_event(stored.uuid, stored.version).unwrap();
    assert!(repo.get_event(stored.uuid).unwrap().is_none());

    let err = repo.remove_event(stored.uuid, stored.version).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == stored.uuid));
}

#[test]
fn stale_remove_fails_with_conflict() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let stored = event("carl@x.com", &["anna@x.com"], "planning");
    repo.insert_event(&stored).unwrap();

    // A concurrent edit bumps the stored version past the remover's read.
    let mut editor = repo.get_event(stored.uuid).unwrap().unwrap();
    editor.members.push(Handle::new("bo@x.com"));
    repo.update_event(&editor).unwrap();

    let err = repo.remove_event(stored.uuid, stored.version).unwrap_err();
    assert!(matches!(err, RepoError::Conflict(id) if id == stored.uuid));

    // The row with the concurrent change must survive.
    let loaded = repo.get_event(stored.uuid).unwrap().unwrap();
    assert!(loaded.members.contains(&Handle::new("bo@x.com")));
}

#[test]
fn list_events_uses_stable_storage_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let mut event_a = event("carl@x.com", &[], "a");
    let mut event_b = event("carl@x.com", &[], "b");
    let mut event_c = event("carl@x.com", &[], "c");
    event_a.uuid = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
    event_b.uuid = Uuid::parse_str("00000000-0000-4000-8000-000000000002").unwrap();
    event_c.uuid = Uuid::parse_str("00000000-0000-4000-8000-000000000003").unwrap();
    repo.insert_event(&event_c).unwrap();
    repo.insert_event(&event_a).unwrap();
    repo.insert_event(&event_b).unwrap();

    // Collapse created_at so ordering falls through to the uuid tiebreaker.
    conn.execute("UPDATE events SET created_at = 1234567890000;", [])
        .unwrap();

    let listed = repo.list_events().unwrap();
    let ids: Vec<_> = listed.iter().map(|e| e.uuid).collect();
    assert_eq!(ids, vec![event_a.uuid, event_b.uuid, event_c.uuid]);
}

#[test]
fn validation_failure_blocks_insert_and_update() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let mut bad_range = event("carl@x.com", &[], "bad range");
    bad_range.start_ms = 300;
    bad_range.end_ms = Some(100);
    let insert_err = repo.insert_event(&bad_range).unwrap_err();
    assert!(matches!(
        insert_err,
        RepoError::Validation(EventValidationError::EndBeforeStart { .. })
    ));

    let mut stored = event("carl@x.com", &["anna@x.com"], "good");
    repo.insert_event(&stored).unwrap();

    stored.members.push(Handle::new("anna@x.com"));
    let update_err = repo.update_event(&stored).unwrap_err();
    assert!(matches!(
        update_err,
        RepoError::Validation(EventValidationError::DuplicateMember(handle))
            if handle == Handle::new("anna@x.com")
    ));
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let result = SqliteEventRepository::try_new(&conn);
    match result {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert!(expected_version > 0),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_required_events_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteEventRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("events"))
    ));
}

#[test]
fn repository_rejects_connection_missing_required_events_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE events (
            uuid TEXT PRIMARY KEY NOT NULL,
            creator TEXT NOT NULL,
            members TEXT NOT NULL,
            declined TEXT NOT NULL,
            subject TEXT NOT NULL,
            description TEXT,
            location TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            end_ms INTEGER,
            is_full_day INTEGER NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteEventRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredColumn {
            table: "events",
            column: "version"
        })
    ));
}
