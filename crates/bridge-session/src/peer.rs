//! Local media peer seam.
//!
//! The session manager drives negotiation and teardown through this
//! trait; the concrete peer (a WebRTC peer connection) is supplied by
//! the embedding application. Connection-state changes flow back through
//! a watch channel so the manager can observe `connecting → connected`
//! and failures without polling.

use crate::errors::BridgeError;
use std::sync::Arc;
use tokio::sync::watch;

/// Connection state of a local media peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Failed,
    Closed,
}

/// A local media peer (one per bridge session).
#[async_trait::async_trait]
pub trait MediaPeer: Send + Sync {
    /// Create the local SDP offer and set it as the local description.
    async fn create_offer(&self) -> Result<String, BridgeError>;

    /// Set the remote answer. Only after this succeeds is the session
    /// `connecting`.
    async fn set_remote_answer(&self, answer: &str) -> Result<(), BridgeError>;

    /// Connection-state changes, starting from the current state.
    fn state_changes(&self) -> watch::Receiver<PeerConnectionState>;

    /// Close the peer and release local media resources. Synchronous:
    /// teardown must not depend on any remote party.
    fn close(&self);
}

/// Creates one peer per session.
pub trait MediaPeerFactory: Send + Sync {
    fn create_peer(&self) -> Result<Arc<dyn MediaPeer>, BridgeError>;
}

/// Mock peer for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Controllable mock peer. Tests drive connection state through
    /// [`MockPeer::set_state`].
    pub struct MockPeer {
        state_tx: watch::Sender<PeerConnectionState>,
        fail_offer: AtomicBool,
        fail_answer: AtomicBool,
        closed: AtomicBool,
        answers: Mutex<Vec<String>>,
    }

    impl Default for MockPeer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockPeer {
        #[must_use]
        pub fn new() -> Self {
            let (state_tx, _) = watch::channel(PeerConnectionState::New);
            Self {
                state_tx,
                fail_offer: AtomicBool::new(false),
                fail_answer: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                answers: Mutex::new(Vec::new()),
            }
        }

        /// Drive a connection-state change, as ICE/DTLS progress would.
        pub fn set_state(&self, state: PeerConnectionState) {
            let _ = self.state_tx.send(state);
        }

        pub fn fail_offer(&self, fail: bool) {
            self.fail_offer.store(fail, Ordering::SeqCst);
        }

        pub fn fail_answer(&self, fail: bool) {
            self.fail_answer.store(fail, Ordering::SeqCst);
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        /// Remote answers applied so far.
        pub fn answers(&self) -> Vec<String> {
            match self.answers.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }
    }

    #[async_trait::async_trait]
    impl MediaPeer for MockPeer {
        async fn create_offer(&self) -> Result<String, BridgeError> {
            if self.fail_offer.load(Ordering::SeqCst) {
                return Err(BridgeError::NegotiationFailed(
                    "mock offer failure".to_string(),
                ));
            }
            Ok("v=0 offer".to_string())
        }

        async fn set_remote_answer(&self, answer: &str) -> Result<(), BridgeError> {
            if self.fail_answer.load(Ordering::SeqCst) {
                return Err(BridgeError::NegotiationFailed(
                    "mock answer rejection".to_string(),
                ));
            }
            match self.answers.lock() {
                Ok(mut guard) => guard.push(answer.to_string()),
                Err(poisoned) => poisoned.into_inner().push(answer.to_string()),
            }
            Ok(())
        }

        fn state_changes(&self) -> watch::Receiver<PeerConnectionState> {
            self.state_tx.subscribe()
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            let _ = self.state_tx.send(PeerConnectionState::Closed);
        }
    }

    /// Factory handing out pre-built mock peers, retaining handles so
    /// tests can drive them.
    #[derive(Default)]
    pub struct MockPeerFactory {
        peers: Mutex<Vec<Arc<MockPeer>>>,
        created: AtomicUsize,
    }

    impl MockPeerFactory {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The `n`th peer created, if any.
        pub fn peer(&self, n: usize) -> Option<Arc<MockPeer>> {
            match self.peers.lock() {
                Ok(guard) => guard.get(n).cloned(),
                Err(poisoned) => poisoned.into_inner().get(n).cloned(),
            }
        }

        pub fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    impl MediaPeerFactory for MockPeerFactory {
        fn create_peer(&self) -> Result<Arc<dyn MediaPeer>, BridgeError> {
            let peer = Arc::new(MockPeer::new());
            match self.peers.lock() {
                Ok(mut guard) => guard.push(peer.clone()),
                Err(poisoned) => poisoned.into_inner().push(peer.clone()),
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(peer)
        }
    }
}
