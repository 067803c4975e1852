//! Actor-based stream lifecycle management.
//!
//! Each active broadcast resource is owned by exactly one [`stream::StreamActor`];
//! all mutations of a resource are serialized through its mailbox, so
//! per-resource operations need no locks. The [`supervisor::BroadcastSupervisor`]
//! owns the actor registry and enforces access control at the public surface.

pub mod stream;
pub mod supervisor;
