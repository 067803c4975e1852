//! Shared types for the Stillwater broadcast core.
//!
//! This crate holds the small set of types every other crate needs:
//! strongly typed identifiers and secret-handling re-exports. Anything
//! with behavior lives in the component crates.

/// Secret types for sensitive values
pub mod secret;

/// Strongly typed identifiers
pub mod types;
