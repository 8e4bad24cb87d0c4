//! Domain model for the event scheduler.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep handle normalization in one place so case-insensitive matching is
//!   a type property, not a call-site convention.
//!
//! # Invariants
//! - Every event is identified by a stable `EventId`.
//! - All stored/compared user identifiers are canonical `Handle` values.

pub mod event;
pub mod handle;
