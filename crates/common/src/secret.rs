//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate. Use `SecretString` for every
//! sensitive value the core touches: live-input stream keys, bridge ingest
//! credentials, and platform API tokens. `Debug` output is redacted, so a
//! struct that derives `Debug` with a `SecretString` field can never leak
//! the value through tracing, and the value is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct IngestTarget {
//!     rtmps_url: String,
//!     stream_key: SecretString,
//! }
//!
//! let target = IngestTarget {
//!     rtmps_url: "rtmps://ingest.example.com/live".to_string(),
//!     stream_key: SecretString::from("sk-live-abc123"),
//! };
//!
//! // Redacted: the key never appears in Debug output.
//! assert!(!format!("{target:?}").contains("sk-live-abc123"));
//!
//! // Access requires an explicit expose_secret() call.
//! assert_eq!(target.stream_key.expose_secret(), "sk-live-abc123");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
