//! Lifecycle observer seam.
//!
//! The session manager reports ingest connectivity upward through this
//! trait; the broadcast supervisor turns those reports into stream
//! lifecycle transitions. The manager never blocks on the observer's
//! own failures.

use broadcast_control::actors::stream::BridgeEvent;
use broadcast_control::BroadcastSupervisor;
use common::types::StreamId;
use tracing::warn;

/// Receives ingest connectivity reports for streams.
#[async_trait::async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Media is flowing for the stream.
    async fn ingest_connected(&self, stream_id: StreamId);

    /// The ingest path failed. `fatal` marks failures the ingest layer
    /// cannot recover from.
    async fn ingest_failed(&self, stream_id: StreamId, fatal: bool);
}

#[async_trait::async_trait]
impl LifecycleObserver for BroadcastSupervisor {
    async fn ingest_connected(&self, stream_id: StreamId) {
        if let Err(e) = self.bridge_event(stream_id, BridgeEvent::Connected).await {
            warn!(
                target: "bridge.observer",
                stream_id = %stream_id,
                error = %e,
                "Failed to report ingest connect"
            );
        }
    }

    async fn ingest_failed(&self, stream_id: StreamId, fatal: bool) {
        if let Err(e) = self
            .bridge_event(stream_id, BridgeEvent::Failed { fatal })
            .await
        {
            warn!(
                target: "bridge.observer",
                stream_id = %stream_id,
                error = %e,
                "Failed to report ingest failure"
            );
        }
    }
}

/// Mock observer for testing.
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// One recorded report.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Report {
        Connected(StreamId),
        Failed(StreamId, bool),
    }

    /// Observer that records every report.
    #[derive(Default)]
    pub struct RecordingObserver {
        reports: Mutex<Vec<Report>>,
    }

    impl RecordingObserver {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reports(&self) -> Vec<Report> {
            match self.reports.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        }

        fn record(&self, report: Report) {
            match self.reports.lock() {
                Ok(mut guard) => guard.push(report),
                Err(poisoned) => poisoned.into_inner().push(report),
            }
        }
    }

    #[async_trait::async_trait]
    impl LifecycleObserver for RecordingObserver {
        async fn ingest_connected(&self, stream_id: StreamId) {
            self.record(Report::Connected(stream_id));
        }

        async fn ingest_failed(&self, stream_id: StreamId, fatal: bool) {
            self.record(Report::Failed(stream_id, fatal));
        }
    }
}
