//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and directory calls into lifecycle-level APIs.
//! - Keep presentation/transport layers decoupled from storage details.

pub mod event_service;
