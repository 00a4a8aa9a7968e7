//! Board data gateway for a kanban task board.
//!
//! Typed queries and mutations against a remote board service, backed by a
//! process-wide query cache. Mutations invalidate tags so that every live
//! query providing one of those tags is refetched.

pub mod cache;
pub mod config;
pub mod error;
pub mod kanban;
pub mod logging;
pub mod query;
