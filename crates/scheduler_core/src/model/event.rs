//! Event domain model.
//!
//! # Responsibility
//! - Define the canonical event record shared by storage and lifecycle logic.
//! - Enforce field-shape and membership invariants before persistence.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another event.
//! - `creator` never appears in `members`.
//! - `members` contains no duplicate handle.
//! - `declined` is a subset of `members ∪ {creator}`.
//! - `end_ms` must not be earlier than `start_ms` when set.

use crate::model::handle::Handle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for an event.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type EventId = Uuid;

/// Maximum subject length accepted at validation time.
pub const SUBJECT_MAX_CHARS: usize = 100;
/// Maximum description length accepted at validation time.
pub const DESCRIPTION_MAX_CHARS: usize = 400;

/// Validation failure for one event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    /// Subject is empty after trimming.
    EmptySubject,
    /// Subject exceeds the allowed length.
    SubjectTooLong { chars: usize },
    /// Description exceeds the allowed length.
    DescriptionTooLong { chars: usize },
    /// Location is empty after trimming.
    EmptyLocation,
    /// End time lies before start time.
    EndBeforeStart { start_ms: i64, end_ms: i64 },
    /// A member handle normalized to the empty string.
    EmptyMemberHandle,
    /// Creator handle appears in the member list.
    CreatorInMembers(Handle),
    /// Member list contains a repeated handle.
    DuplicateMember(Handle),
    /// Declined set names a handle outside `members ∪ {creator}`.
    DeclinedNonParticipant(Handle),
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySubject => write!(f, "event subject cannot be empty"),
            Self::SubjectTooLong { chars } => write!(
                f,
                "event subject is {chars} characters; maximum is {SUBJECT_MAX_CHARS}"
            ),
            Self::DescriptionTooLong { chars } => write!(
                f,
                "event description is {chars} characters; maximum is {DESCRIPTION_MAX_CHARS}"
            ),
            Self::EmptyLocation => write!(f, "event location cannot be empty"),
            Self::EndBeforeStart { start_ms, end_ms } => write!(
                f,
                "event end time {end_ms} lies before start time {start_ms}"
            ),
            Self::EmptyMemberHandle => write!(f, "member handle cannot be empty"),
            Self::CreatorInMembers(handle) => {
                write!(f, "creator `{handle}` cannot appear in the member list")
            }
            Self::DuplicateMember(handle) => {
                write!(f, "member `{handle}` appears more than once")
            }
            Self::DeclinedNonParticipant(handle) => write!(
                f,
                "declined handle `{handle}` is neither a member nor the creator"
            ),
        }
    }
}

impl Error for EventValidationError {}

/// Canonical event record.
///
/// `members` stays an ordered sequence (input order is user-visible), with
/// uniqueness enforced by `validate()`; `declined` is a true set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Stable global ID used for lookups and auditing.
    pub uuid: EventId,
    /// Handle of the creating user. Immutable after creation.
    pub creator: Handle,
    /// Invited member handles, distinct, creator excluded.
    pub members: Vec<Handle>,
    /// Handles (members plus, possibly, the creator) who declined.
    pub declined: BTreeSet<Handle>,
    /// Required short title.
    pub subject: String,
    /// Optional free-form text.
    pub description: Option<String>,
    /// Required location text.
    pub location: String,
    /// Start time in epoch milliseconds.
    pub start_ms: i64,
    /// Optional end time in epoch milliseconds. Should be >= `start_ms`.
    pub end_ms: Option<i64>,
    /// Whole-day marker; times are still stored as given.
    pub is_full_day: bool,
    /// Storage version token for optimistic concurrency. Starts at 1.
    pub version: i64,
}

/// Caller-supplied input for create/edit operations.
///
/// Member handles arrive raw (mixed case allowed); the lifecycle engine
/// normalizes them before any comparison.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventDraft {
    pub subject: String,
    pub description: Option<String>,
    pub location: String,
    pub start_ms: i64,
    pub end_ms: Option<i64>,
    pub is_full_day: bool,
    /// Raw member handles as typed by the caller.
    pub members: Vec<String>,
}

impl Event {
    /// Creates a new event with a generated stable ID and empty declined set.
    pub fn new(creator: Handle, members: Vec<Handle>, draft: &EventDraft) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            creator,
            members,
            declined: BTreeSet::new(),
            subject: draft.subject.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            start_ms: draft.start_ms,
            end_ms: draft.end_ms,
            is_full_day: draft.is_full_day,
            version: 1,
        }
    }

    /// Validates field-shape and membership invariants.
    ///
    /// Repository write paths call this before any SQL mutation; read paths
    /// call it to reject invalid persisted state instead of masking it.
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.subject.trim().is_empty() {
            return Err(EventValidationError::EmptySubject);
        }
        let subject_chars = self.subject.chars().count();
        if subject_chars > SUBJECT_MAX_CHARS {
            return Err(EventValidationError::SubjectTooLong {
                chars: subject_chars,
            });
        }
        if let Some(description) = &self.description {
            let chars = description.chars().count();
            if chars > DESCRIPTION_MAX_CHARS {
                return Err(EventValidationError::DescriptionTooLong { chars });
            }
        }
        if self.location.trim().is_empty() {
            return Err(EventValidationError::EmptyLocation);
        }
        if let Some(end_ms) = self.end_ms {
            if end_ms < self.start_ms {
                return Err(EventValidationError::EndBeforeStart {
                    start_ms: self.start_ms,
                    end_ms,
                });
            }
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.is_empty() {
                return Err(EventValidationError::EmptyMemberHandle);
            }
            if *member == self.creator {
                return Err(EventValidationError::CreatorInMembers(member.clone()));
            }
            if !seen.insert(member) {
                return Err(EventValidationError::DuplicateMember(member.clone()));
            }
        }

        for handle in &self.declined {
            if *handle != self.creator && !self.members.contains(handle) {
                return Err(EventValidationError::DeclinedNonParticipant(handle.clone()));
            }
        }

        Ok(())
    }

    /// Returns whether the given handle is the creator or a member.
    pub fn is_participant(&self, handle: &Handle) -> bool {
        *handle == self.creator || self.members.contains(handle)
    }

    /// Returns whether every member and the creator has declined.
    ///
    /// The `+ 1` accounts for the creator, who is counted in `declined` but
    /// never in `members`.
    pub fn all_declined(&self) -> bool {
        self.declined.len() == self.members.len() + 1
    }
}
