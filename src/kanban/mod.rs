//! Board service module.
//! Endpoint definitions, transport and the cached gateway for the kanban API.

pub mod api_types;
pub mod client;
pub mod endpoints;
pub mod gateway;
pub mod keys;
pub mod types;

pub use client::{HttpTransport, Transport};
pub use gateway::BoardGateway;
pub use keys::KanbanQueryKey;
pub use types::*;
