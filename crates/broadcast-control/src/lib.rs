//! Broadcast Control Library
//!
//! Core of the memorial live/recorded broadcast system:
//!
//! - Stream lifecycle state machine (scheduled through completed, with a
//!   bounded recording readiness poll after a broadcast ends)
//! - Schedule-to-stream reconciliation (desired set derived from the
//!   service schedule, diffed by key and content hash)
//! - Access-gated operation surface built on the `access-control` resolver
//!
//! # Architecture
//!
//! Per-resource mutations are serialized through an actor per stream id:
//!
//! ```text
//! BroadcastSupervisor (actor registry + access gate)
//! └── supervises N StreamActors
//!     └── StreamActor (one per broadcast resource)
//!         ├── owns all lifecycle transitions
//!         └── runs the recording readiness poll
//! ```
//!
//! Reconciliation routes its writes through the same actors, so a
//! schedule edit can never race a lifecycle transition on one resource.
//!
//! # Modules
//!
//! - [`actors`] - Stream actors and the supervisor
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error taxonomy (denial vs. conflict vs. infrastructure)
//! - [`models`] - Canonical resource schema and schedule derivation
//! - [`platform`] - External live-video platform client
//! - [`reconcile`] - Schedule-to-stream reconciliation engine
//! - [`store`] - Keyed document store boundary

pub mod actors;
pub mod config;
pub mod errors;
pub mod models;
pub mod platform;
pub mod reconcile;
pub mod store;

pub use actors::stream::{BridgeEvent, StartInfo};
pub use actors::supervisor::{BroadcastSupervisor, NewStream};
pub use config::BroadcastConfig;
pub use errors::BroadcastError;
pub use models::{BroadcastResource, StreamStatus};
pub use reconcile::{reconcile, reconcile_for, ReconcileReport};
