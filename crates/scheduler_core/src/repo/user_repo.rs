//! User directory contracts and SQLite implementation.
//!
//! # Responsibility
//! - Resolve canonical handles to registered users and display names.
//! - Enumerate registered handles and users for membership validation and
//!   roster displays.
//! - Own the registration/seed path used by tooling and tests.
//!
//! # Invariants
//! - The lifecycle engine only ever reads through `UserDirectory`.
//! - Stored handles are canonical; shape is validated at registration time.

use crate::db::DbError;
use crate::model::handle::Handle;
use crate::repo::event_repo::{table_exists, table_has_column};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

// Deliberately loose: one `@`, no whitespace. Real deliverability checks
// belong to the account-registration flow, not the directory.
static HANDLE_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid handle shape regex"));

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors from user directory operations.
#[derive(Debug)]
pub enum DirectoryError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Handle does not look like an e-mail address.
    InvalidHandle(String),
    /// Handle is already registered.
    DuplicateHandle(Handle),
    /// Name fields are empty after trimming.
    EmptyName,
    /// Required table is missing from the connection schema.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidHandle(raw) => {
                write!(f, "`{raw}` is not a valid e-mail style handle")
            }
            Self::DuplicateHandle(handle) => {
                write!(f, "handle `{handle}` is already registered")
            }
            Self::EmptyName => write!(f, "first and last name cannot be empty"),
            Self::MissingRequiredTable(table) => {
                write!(f, "user directory requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "user directory requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for DirectoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for DirectoryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DirectoryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Registered user read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Canonical handle (login identity).
    pub handle: Handle,
    pub first_name: String,
    pub last_name: String,
}

impl User {
    /// Presentation name derived from first/last name.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Read-only directory interface consumed by the lifecycle engine.
pub trait UserDirectory {
    /// Resolves one handle to a registered user.
    fn lookup_user(&self, handle: &Handle) -> DirectoryResult<Option<User>>;
    /// Returns every registered handle.
    fn all_handles(&self) -> DirectoryResult<BTreeSet<Handle>>;
    /// Lists every registered user, ordered by handle.
    fn list_users(&self) -> DirectoryResult<Vec<User>>;
}

/// SQLite-backed user directory.
pub struct SqliteUserDirectory<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserDirectory<'conn> {
    /// Constructs a directory from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> DirectoryResult<Self> {
        ensure_directory_ready(conn)?;
        Ok(Self { conn })
    }

    /// Registers one user. Seed/tooling path; the lifecycle engine never
    /// calls this.
    pub fn register_user(
        &self,
        raw_handle: &str,
        first_name: &str,
        last_name: &str,
    ) -> DirectoryResult<User> {
        let handle = Handle::new(raw_handle);
        if !HANDLE_SHAPE_RE.is_match(handle.as_str()) {
            return Err(DirectoryError::InvalidHandle(raw_handle.to_string()));
        }
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(DirectoryError::EmptyName);
        }
        if self.lookup_user(&handle)?.is_some() {
            return Err(DirectoryError::DuplicateHandle(handle));
        }

        self.conn.execute(
            "INSERT INTO users (handle, first_name, last_name) VALUES (?1, ?2, ?3);",
            params![handle.as_str(), first_name, last_name],
        )?;

        Ok(User {
            handle,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        })
    }
}

impl UserDirectory for SqliteUserDirectory<'_> {
    fn lookup_user(&self, handle: &Handle) -> DirectoryResult<Option<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT handle, first_name, last_name
             FROM users
             WHERE handle = ?1;",
        )?;

        let mut rows = stmt.query([handle.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(User {
                handle: Handle::new(row.get::<_, String>(0)?),
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            }));
        }

        Ok(None)
    }

    fn all_handles(&self) -> DirectoryResult<BTreeSet<Handle>> {
        let mut stmt = self.conn.prepare("SELECT handle FROM users;")?;
        let mut rows = stmt.query([])?;
        let mut handles = BTreeSet::new();
        while let Some(row) = rows.next()? {
            handles.insert(Handle::new(row.get::<_, String>(0)?));
        }
        Ok(handles)
    }

    fn list_users(&self) -> DirectoryResult<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT handle, first_name, last_name
             FROM users
             ORDER BY handle ASC;",
        )?;

        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(User {
                handle: Handle::new(row.get::<_, String>(0)?),
                first_name: row.get(1)?,
                last_name: row.get(2)?,
            });
        }
        Ok(users)
    }
}

fn ensure_directory_ready(conn: &Connection) -> DirectoryResult<()> {
    if !table_exists(conn, "users")? {
        return Err(DirectoryError::MissingRequiredTable("users"));
    }

    for column in ["handle", "first_name", "last_name"] {
        if !table_has_column(conn, "users", column)? {
            return Err(DirectoryError::MissingRequiredColumn {
                table: "users",
                column,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::HANDLE_SHAPE_RE;

    #[test]
    fn handle_shape_accepts_plain_addresses() {
        assert!(HANDLE_SHAPE_RE.is_match("anna.berg@example.com"));
        assert!(HANDLE_SHAPE_RE.is_match("x@y.se"));
    }

    #[test]
    fn handle_shape_rejects_obvious_garbage() {
        assert!(!HANDLE_SHAPE_RE.is_match("no-at-sign"));
        assert!(!HANDLE_SHAPE_RE.is_match("two@@example.com"));
        assert!(!HANDLE_SHAPE_RE.is_match("spaced name@example.com"));
        assert!(!HANDLE_SHAPE_RE.is_match("missing@tld"));
    }
}
