//! Core domain logic for the multi-user event scheduler.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::event::{Event, EventDraft, EventId, EventValidationError};
pub use model::handle::Handle;
pub use repo::event_repo::{EventRepository, RepoError, RepoResult, SqliteEventRepository};
pub use repo::user_repo::{
    DirectoryError, DirectoryResult, SqliteUserDirectory, User, UserDirectory,
};
pub use service::event_service::{
    DeclineOutcome, EditOutcome, EventService, EventServiceError, EventView,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
