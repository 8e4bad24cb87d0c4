//! Canonical user handle type.
//!
//! # Responsibility
//! - Normalize raw user input (trim + lowercase) into one canonical form.
//! - Keep every membership comparison in core on the canonical form.
//!
//! # Invariants
//! - A `Handle` is always trimmed and lower-cased.
//! - Display names never flow back into `Handle` values; presentation
//!   projections live in the service layer read models.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Canonical unique identifier for a user (an e-mail address in practice).
///
/// Handle comparison is case-insensitive; this type makes that a
/// construction-time property instead of scattering `to_lowercase()`
/// across call sites.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Normalizes raw caller input into the canonical handle form.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns whether the handle normalized to nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Handle {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Handle> for String {
    fn from(value: Handle) -> Self {
        value.0
    }
}

impl From<&str> for Handle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Joins handles for user-facing error messages, e.g. `a@x.com, b@x.com`.
pub fn join_handles(handles: &[Handle]) -> String {
    handles
        .iter()
        .map(Handle::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::{join_handles, Handle};

    #[test]
    fn new_trims_and_lowercases() {
        let handle = Handle::new("  Anna.Berg@Example.COM ");
        assert_eq!(handle.as_str(), "anna.berg@example.com");
    }

    #[test]
    fn mixed_case_inputs_compare_equal() {
        assert_eq!(Handle::new("A@X.COM"), Handle::new("a@x.com"));
    }

    #[test]
    fn serde_round_trip_stays_canonical() {
        let handle: Handle = serde_json::from_str("\" B@X.com \"").unwrap();
        assert_eq!(handle.as_str(), "b@x.com");
        assert_eq!(serde_json::to_string(&handle).unwrap(), "\"b@x.com\"");
    }

    #[test]
    fn join_handles_is_comma_separated() {
        let handles = vec![Handle::new("a@x.com"), Handle::new("b@x.com")];
        assert_eq!(join_handles(&handles), "a@x.com, b@x.com");
    }
}
