//! Access control for memorial broadcast resources.
//!
//! Five independent grant sources (ownership, director assignment, accepted
//! invitations, follow relationships, public visibility) merge into a single
//! decision. The resolver is a pure function over an immutable
//! [`models::AccessSnapshot`]; assembling the snapshot from the read-only
//! invitation/follow store is the only async step and lives in [`store`].
//!
//! Every decision is reproducible from `(principal, snapshot)` alone: the
//! resolver performs no reads, no writes, and consults no clock.

/// Principal, snapshot, and decision types
pub mod models;

/// The ordered-rule resolver
pub mod resolver;

/// Read-only invitation/follow store and snapshot assembly
pub mod store;

pub use models::{AccessDecision, AccessLevel, AccessSnapshot, Action, Principal, Role};
pub use resolver::resolve;
