//! Core business logic - framework-agnostic, every operation takes the caller's
//! [`actor::Actor`] and a database connection and returns a typed [`crate::errors::Result`].

/// Authorization gate
pub mod access;
/// Caller identity
pub mod actor;
/// Confirmation gate
pub mod confirmation;
/// Transition event outbox
pub mod events;
/// Quantity ledger
pub mod ledger;
/// Project aggregate and project definition
pub mod project;
/// Request lifecycle manager
pub mod request;

pub use actor::Actor;
