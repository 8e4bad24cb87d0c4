//! Event lifecycle engine.
//!
//! # Responsibility
//! - Validate membership lists at create/edit time.
//! - Track per-event decline state and apply the deletion invariant.
//! - Project stored handles to display names for presentation callers.
//!
//! # Invariants
//! - Every entry point takes the caller handle explicitly; there is no
//!   ambient current-user context.
//! - An event is removed exactly when `declined.len() == members.len() + 1`
//!   (every member plus the creator).
//! - Display-name substitution happens only in read models (`EventView`);
//!   stored events always carry canonical handles.
//! - A version conflict is retried at most once, and only on the decline
//!   path, where the write derives entirely from freshly read state.

use crate::model::event::{Event, EventDraft, EventId};
use crate::model::handle::{join_handles, Handle};
use crate::repo::event_repo::{EventRepository, RepoError};
use crate::repo::user_repo::{DirectoryError, UserDirectory};
use log::info;
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for event lifecycle use-cases.
#[derive(Debug)]
pub enum EventServiceError {
    /// Target event does not exist (or was already removed).
    EventNotFound(EventId),
    /// Caller listed themselves as a member of their own event.
    CreatorIsMember(Handle),
    /// Member list names the same handle more than once.
    DuplicateMembers(Vec<Handle>),
    /// Member list names handles with no directory registration.
    UnregisteredMembers(Vec<Handle>),
    /// Caller is neither the creator nor a member of the event.
    NotParticipant(Handle),
    /// Another writer changed the event since it was read.
    Conflict(EventId),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Directory-layer failure.
    Directory(DirectoryError),
}

impl Display for EventServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventNotFound(id) => write!(f, "event not found: {id}"),
            Self::CreatorIsMember(handle) => write!(
                f,
                "`{handle}` created this event and is already part of it; creators cannot be listed as members"
            ),
            Self::DuplicateMembers(handles) => write!(
                f,
                "members listed more than once: {}",
                join_handles(handles)
            ),
            Self::UnregisteredMembers(handles) => write!(
                f,
                "not registered with the scheduler: {}",
                join_handles(handles)
            ),
            Self::NotParticipant(handle) => {
                write!(f, "`{handle}` is not a participant of this event")
            }
            Self::Conflict(id) => write!(f, "concurrent update conflict on event: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Directory(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EventServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Directory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for EventServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::EventNotFound(id),
            RepoError::Conflict(id) => Self::Conflict(id),
            other => Self::Repo(other),
        }
    }
}

impl From<DirectoryError> for EventServiceError {
    fn from(value: DirectoryError) -> Self {
        Self::Directory(value)
    }
}

/// Presentation read model: handles replaced by directory display names.
///
/// Never persisted; handles without a directory entry fall back to their raw
/// canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventView {
    pub uuid: EventId,
    /// Creator display name (or raw handle when unresolvable).
    pub creator: String,
    /// Member display names in stored member order.
    pub members: Vec<String>,
    /// How many participants (members + possibly the creator) declined.
    pub declined_count: usize,
    pub subject: String,
    pub description: Option<String>,
    pub location: String,
    pub start_ms: i64,
    pub end_ms: Option<i64>,
    pub is_full_day: bool,
}

/// Result of a decline action, for confirmation display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclineOutcome {
    /// Final event state, including the caller's decline.
    pub event: Event,
    /// Whether the deletion invariant fired and the event was removed.
    pub removed: bool,
}

/// Result of an edit, for confirmation display.
///
/// An edit that shrinks the member list can leave every remaining
/// participant a decliner, in which case the event is removed instead of
/// updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// Final event state after reconciliation.
    pub event: Event,
    /// Whether the deletion invariant fired and the event was removed.
    pub removed: bool,
}

/// Lifecycle engine facade over the event store and user directory.
pub struct EventService<R: EventRepository, D: UserDirectory> {
    events: R,
    directory: D,
}

impl<R: EventRepository, D: UserDirectory> EventService<R, D> {
    /// Creates a service using the provided collaborators.
    pub fn new(events: R, directory: D) -> Self {
        Self { events, directory }
    }

    /// Lists every event the caller participates in, as display projections.
    ///
    /// Returns events in stable storage order; read-only.
    pub fn list_visible_events(
        &self,
        caller: &Handle,
    ) -> Result<Vec<EventView>, EventServiceError> {
        let mut views = Vec::new();
        for event in self.events.list_events()? {
            if event.is_participant(caller) {
                views.push(self.project(&event)?);
            }
        }
        Ok(views)
    }

    /// Returns one event as a display projection.
    pub fn view_event(&self, id: EventId) -> Result<EventView, EventServiceError> {
        let event = self
            .events
            .get_event(id)?
            .ok_or(EventServiceError::EventNotFound(id))?;
        self.project(&event)
    }

    /// Creates a new event owned by the caller.
    ///
    /// # Contract
    /// - Member handles are normalized before any comparison.
    /// - Fails with `CreatorIsMember`, `DuplicateMembers` or
    ///   `UnregisteredMembers` (in that order), naming the offending handles.
    /// - Validation failures leave no partial state behind.
    pub fn create_event(
        &self,
        caller: &Handle,
        draft: &EventDraft,
    ) -> Result<Event, EventServiceError> {
        let members = normalize_members(&draft.members);
        self.check_member_list(caller, &members, true)?;

        let event = Event::new(caller.clone(), members, draft);
        self.events.insert_event(&event)?;

        info!(
            "event=event_create module=service status=ok id={} creator={} members={}",
            event.uuid,
            event.creator,
            event.members.len()
        );
        Ok(event)
    }

    /// Replaces an event's editable fields and membership list.
    ///
    /// # Contract
    /// - `uuid` and `creator` are immutable; stored values are re-asserted
    ///   and nothing in `draft` can change them.
    /// - The declined set is reconciled: members removed by the edit are
    ///   dropped from it, newly added members start undeclined, and the
    ///   creator's own decline (if any) is retained unconditionally.
    /// - Member registration is not re-validated on edit.
    /// - When the reconciled state satisfies
    ///   `declined.len() == members.len() + 1` the event is removed instead
    ///   of updated, and the outcome says so.
    /// - A stale write fails with `Conflict`; the caller should reload and
    ///   retry once.
    pub fn edit_event(
        &self,
        caller: &Handle,
        id: EventId,
        draft: &EventDraft,
    ) -> Result<EditOutcome, EventServiceError> {
        let current = self
            .events
            .get_event(id)?
            .ok_or(EventServiceError::EventNotFound(id))?;

        let members = normalize_members(&draft.members);
        self.check_member_list(&current.creator, &members, false)?;

        let declined: BTreeSet<Handle> = current
            .declined
            .iter()
            .filter(|handle| **handle == current.creator || members.contains(handle))
            .cloned()
            .collect();

        let mut updated = Event {
            uuid: current.uuid,
            creator: current.creator,
            members,
            declined,
            subject: draft.subject.clone(),
            description: draft.description.clone(),
            location: draft.location.clone(),
            start_ms: draft.start_ms,
            end_ms: draft.end_ms,
            is_full_day: draft.is_full_day,
            version: current.version,
        };

        // Shrinking the member list can satisfy the deletion invariant on
        // its own; retained declines never get another decline call to
        // re-trigger it, so it has to fire here.
        if updated.all_declined() {
            self.events.remove_event(updated.uuid, updated.version)?;
            info!(
                "event=event_remove module=service status=ok id={} reason=all_declined_after_edit",
                updated.uuid
            );
            return Ok(EditOutcome {
                event: updated,
                removed: true,
            });
        }

        self.events.update_event(&updated)?;
        updated.version += 1;

        info!(
            "event=event_edit module=service status=ok id={} caller={} members={} declined={}",
            updated.uuid,
            caller,
            updated.members.len(),
            updated.declined.len()
        );
        Ok(EditOutcome {
            event: updated,
            removed: false,
        })
    }

    /// Records the caller's decline; removes the event once everyone has.
    ///
    /// # Contract
    /// - Only the creator or a member may decline.
    /// - Redeclaring a decline is a no-op, never an error.
    /// - When `declined.len() == members.len() + 1` the event is permanently
    ///   removed and subsequent reads yield not-found.
    /// - There is no separate unconditional delete; "delete" routes through
    ///   this path.
    pub fn decline_event(
        &self,
        caller: &Handle,
        id: EventId,
    ) -> Result<DeclineOutcome, EventServiceError> {
        match self.try_decline(caller, id) {
            Err(EventServiceError::Conflict(_)) => {
                // Safe to retry exactly once: the write is derived entirely
                // from re-read state.
                info!(
                    "event=event_decline module=service status=retry id={id} caller={caller}"
                );
                self.try_decline(caller, id)
            }
            other => other,
        }
    }

    fn try_decline(
        &self,
        caller: &Handle,
        id: EventId,
    ) -> Result<DeclineOutcome, EventServiceError> {
        let mut event = self
            .events
            .get_event(id)?
            .ok_or(EventServiceError::EventNotFound(id))?;

        if !event.is_participant(caller) {
            return Err(EventServiceError::NotParticipant(caller.clone()));
        }

        if event.declined.contains(caller) {
            return Ok(DeclineOutcome {
                event,
                removed: false,
            });
        }

        event.declined.insert(caller.clone());

        if event.all_declined() {
            // Versioned delete: a concurrent edit may have added a member
            // since the read, and that member never declined.
            self.events.remove_event(event.uuid, event.version)?;
            info!(
                "event=event_remove module=service status=ok id={} reason=all_declined",
                event.uuid
            );
            return Ok(DeclineOutcome {
                event,
                removed: true,
            });
        }

        self.events.update_event(&event)?;
        event.version += 1;
        info!(
            "event=event_decline module=service status=ok id={} caller={caller} declined={} members={}",
            event.uuid,
            event.declined.len(),
            event.members.len()
        );
        Ok(DeclineOutcome {
            event,
            removed: false,
        })
    }

    /// Validates a normalized member list against the owning creator.
    ///
    /// Registration is checked only when `check_registration` is set
    /// (create path); edits trust the registration performed at creation.
    fn check_member_list(
        &self,
        creator: &Handle,
        members: &[Handle],
        check_registration: bool,
    ) -> Result<(), EventServiceError> {
        if members.iter().any(|member| member == creator) {
            return Err(EventServiceError::CreatorIsMember(creator.clone()));
        }

        let duplicates = duplicate_handles(members);
        if !duplicates.is_empty() {
            return Err(EventServiceError::DuplicateMembers(duplicates));
        }

        if check_registration {
            let registered = self.directory.all_handles()?;
            let unregistered: Vec<Handle> = members
                .iter()
                .filter(|member| !registered.contains(*member))
                .cloned()
                .collect();
            if !unregistered.is_empty() {
                return Err(EventServiceError::UnregisteredMembers(unregistered));
            }
        }

        Ok(())
    }

    fn project(&self, event: &Event) -> Result<EventView, EventServiceError> {
        let mut members = Vec::with_capacity(event.members.len());
        for member in &event.members {
            members.push(self.display_name(member)?);
        }

        Ok(EventView {
            uuid: event.uuid,
            creator: self.display_name(&event.creator)?,
            members,
            declined_count: event.declined.len(),
            subject: event.subject.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start_ms: event.start_ms,
            end_ms: event.end_ms,
            is_full_day: event.is_full_day,
        })
    }

    fn display_name(&self, handle: &Handle) -> Result<String, EventServiceError> {
        Ok(self
            .directory
            .lookup_user(handle)?
            .map(|user| user.display_name())
            .unwrap_or_else(|| handle.to_string()))
    }
}

fn normalize_members(raw_members: &[String]) -> Vec<Handle> {
    raw_members.iter().map(Handle::new).collect()
}

/// Returns handles appearing more than once, in first-appearance order.
fn duplicate_handles(members: &[Handle]) -> Vec<Handle> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for member in members {
        if !seen.insert(member) && !duplicates.contains(member) {
            duplicates.push(member.clone());
        }
    }
    duplicates
}

#[cfg(test)]
mod tests {
    use super::{duplicate_handles, normalize_members};
    use crate::model::handle::Handle;

    #[test]
    fn normalize_members_canonicalizes_case() {
        let members = normalize_members(&["A@X.com".to_string(), " b@x.com ".to_string()]);
        assert_eq!(members, vec![Handle::new("a@x.com"), Handle::new("b@x.com")]);
    }

    #[test]
    fn duplicate_handles_reports_each_offender_once() {
        let members = vec![
            Handle::new("a@x.com"),
            Handle::new("b@x.com"),
            Handle::new("a@x.com"),
            Handle::new("a@x.com"),
        ];
        assert_eq!(duplicate_handles(&members), vec![Handle::new("a@x.com")]);
    }

    #[test]
    fn duplicate_handles_empty_for_distinct_members() {
        let members = vec![Handle::new("a@x.com"), Handle::new("b@x.com")];
        assert!(duplicate_handles(&members).is_empty());
    }
}
