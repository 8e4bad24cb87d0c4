//! Event store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable CRUD APIs over canonical `events` storage.
//! - Keep SQL and JSON-column details inside the core persistence boundary.
//! - Detect stale writes through a per-row version token.
//!
//! # Invariants
//! - Write paths must call `Event::validate()` before SQL mutations.
//! - Read paths must reject invalid persisted state instead of masking it.
//! - `update` and `remove` never touch a row whose version differs from the
//!   one the writer read.

use crate::db::DbError;
use crate::db::migrations::latest_version;
use crate::model::event::{Event, EventId, EventValidationError};
use crate::model::handle::Handle;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const EVENT_SELECT_SQL: &str = "SELECT
    uuid,
    creator,
    members,
    declined,
    subject,
    description,
    location,
    start_ms,
    end_ms,
    is_full_day,
    version
FROM events";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for event persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Domain invariant violated before persistence.
    Validation(EventValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target event does not exist.
    NotFound(EventId),
    /// The stored row changed (or vanished and re-appeared) since it was
    /// read; the caller should reload and retry once.
    Conflict(EventId),
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
    /// Persisted data cannot be converted to a valid domain record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "event not found: {id}"),
            Self::Conflict(id) => write!(f, "concurrent update conflict on event: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "event repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "event repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "event repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted event data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EventValidationError> for RepoError {
    fn from(value: EventValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for event CRUD operations.
pub trait EventRepository {
    /// Persists a new event and returns its stable id.
    fn insert_event(&self, event: &Event) -> RepoResult<EventId>;
    /// Gets one event by id.
    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>>;
    /// Lists every stored event in stable storage order.
    fn list_events(&self) -> RepoResult<Vec<Event>>;
    /// Replaces a stored event if and only if its version still equals
    /// `event.version`. The stored version is incremented on success.
    fn update_event(&self, event: &Event) -> RepoResult<()>;
    /// Hard-deletes one event if and only if its stored version still equals
    /// `version`.
    fn remove_event(&self, id: EventId, version: i64) -> RepoResult<()>;
}

/// SQLite-backed event repository.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn insert_event(&self, event: &Event) -> RepoResult<EventId> {
        event.validate()?;

        self.conn.execute(
            "INSERT INTO events (
                uuid,
                creator,
                members,
                declined,
                subject,
                description,
                location,
                start_ms,
                end_ms,
                is_full_day,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                event.uuid.to_string(),
                event.creator.as_str(),
                handles_to_json(event.members.iter())?,
                handles_to_json(event.declined.iter())?,
                event.subject.as_str(),
                event.description.as_deref(),
                event.location.as_str(),
                event.start_ms,
                event.end_ms,
                i64::from(event.is_full_day),
                event.version,
            ],
        )?;

        Ok(event.uuid)
    }

    fn get_event(&self, id: EventId) -> RepoResult<Option<Event>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EVENT_SELECT_SQL} WHERE uuid = ?1;"))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_event_row(row)?));
        }

        Ok(None)
    }

    fn list_events(&self) -> RepoResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(&format!(
            "{EVENT_SELECT_SQL} ORDER BY created_at ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query([])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }

        Ok(events)
    }

    fn update_event(&self, event: &Event) -> RepoResult<()> {
        event.validate()?;

        let changed = self.conn.execute(
            "UPDATE events
             SET
                members = ?1,
                declined = ?2,
                subject = ?3,
                description = ?4,
                location = ?5,
                start_ms = ?6,
                end_ms = ?7,
                is_full_day = ?8,
                version = version + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?9
               AND version = ?10;",
            params![
                handles_to_json(event.members.iter())?,
                handles_to_json(event.declined.iter())?,
                event.subject.as_str(),
                event.description.as_deref(),
                event.location.as_str(),
                event.start_ms,
                event.end_ms,
                i64::from(event.is_full_day),
                event.uuid.to_string(),
                event.version,
            ],
        )?;

        if changed == 0 {
            // Distinguish a stale version from a vanished row.
            if event_exists(self.conn, event.uuid)? {
                return Err(RepoError::Conflict(event.uuid));
            }
            return Err(RepoError::NotFound(event.uuid));
        }

        Ok(())
    }

    fn remove_event(&self, id: EventId, version: i64) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM events WHERE uuid = ?1 AND version = ?2;",
            params![id.to_string(), version],
        )?;

        if changed == 0 {
            // Distinguish a stale version from a vanished row.
            if event_exists(self.conn, id)? {
                return Err(RepoError::Conflict(id));
            }
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

fn event_exists(conn: &Connection, id: EventId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM events WHERE uuid = ?1);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn handles_to_json<'a>(handles: impl Iterator<Item = &'a Handle>) -> RepoResult<String> {
    let values: Vec<&str> = handles.map(Handle::as_str).collect();
    serde_json::to_string(&values)
        .map_err(|err| RepoError::InvalidData(format!("cannot serialize handle list: {err}")))
}

fn handles_from_json(column: &str, raw: &str) -> RepoResult<Vec<Handle>> {
    let values: Vec<String> = serde_json::from_str(raw).map_err(|err| {
        RepoError::InvalidData(format!("invalid JSON in events.{column}: {err}"))
    })?;
    Ok(values.into_iter().map(Handle::new).collect())
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<Event> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{uuid_text}` in events.uuid"))
    })?;

    let members_text: String = row.get("members")?;
    let declined_text: String = row.get("declined")?;
    let declined: BTreeSet<Handle> = handles_from_json("declined", &declined_text)?
        .into_iter()
        .collect();

    let is_full_day = match row.get::<_, i64>("is_full_day")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_full_day value `{other}` in events.is_full_day"
            )));
        }
    };

    let event = Event {
        uuid,
        creator: Handle::new(row.get::<_, String>("creator")?),
        members: handles_from_json("members", &members_text)?,
        declined,
        subject: row.get("subject")?,
        description: row.get("description")?,
        location: row.get("location")?,
        start_ms: row.get("start_ms")?,
        end_ms: row.get("end_ms")?,
        is_full_day,
        version: row.get("version")?,
    };
    event.validate()?;
    Ok(event)
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let actual_version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .map_err(|err| RepoError::Db(DbError::Sqlite(err)))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "events")? {
        return Err(RepoError::MissingRequiredTable("events"));
    }

    for column in [
        "uuid",
        "creator",
        "members",
        "declined",
        "subject",
        "description",
        "location",
        "start_ms",
        "end_ms",
        "is_full_day",
        "version",
    ] {
        if !table_has_column(conn, "events", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "events",
                column,
            });
        }
    }

    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
