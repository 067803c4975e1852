//! Bridge Session Library
//!
//! WebRTC bridge sessions for browser-sourced broadcasts: a bridge is
//! reserved on the external recording platform, an SDP offer/answer
//! exchange connects the local media peer to it, and connection-state
//! changes are reported upward to the broadcast lifecycle.
//!
//! # Invariants
//!
//! - One session per stream id; a failed session blocks new starts
//!   until explicitly stopped, so reserved bridges never leak silently.
//! - A failed bridge-start reserved nothing and is safe to retry; a
//!   failed negotiation holds a reserved bridge and requires a stop.
//! - Stop releases local media synchronously and the remote bridge
//!   asynchronously, best-effort.
//! - Every network call has an explicit deadline.
//!
//! # Modules
//!
//! - [`client`] - Recording bridge HTTP client
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types, centered on the retry-vs-stop distinction
//! - [`manager`] - Session manager and connection-state watcher
//! - [`models`] - Session status and grant types
//! - [`observer`] - Upward reporting into the broadcast lifecycle
//! - [`peer`] - Local media peer seam

pub mod client;
pub mod config;
pub mod errors;
pub mod manager;
pub mod models;
pub mod observer;
pub mod peer;

pub use client::{HttpRecordingBridgeClient, RecordingBridgeClient};
pub use config::BridgeConfig;
pub use errors::BridgeError;
pub use manager::BridgeSessionManager;
pub use models::{BridgeGrant, BridgeStatus, SessionInfo};
pub use observer::LifecycleObserver;
pub use peer::{MediaPeer, MediaPeerFactory, PeerConnectionState};
