//! Single-writer runner owning a [`LineTrackingSession`].
//!
//! Every mutation arrives as a [`SessionEvent`] on one mpsc queue; the runner
//! applies them in order and publishes a fresh [`TrackingSnapshot`] on a watch
//! channel whenever something visible changed.

use std::io::BufRead;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use linetrack_core::feed::FeedState;
use linetrack_core::protocol;
use linetrack_core::render::TrackingSnapshot;
use linetrack_core::session::{LineTrackingSession, TrackingOptions};
use linetrack_core::types::{LineRef, VehicleFix};

use crate::api::LineApi;
use crate::error::ClientError;
use crate::live::LiveFeed;

/// Bound of the event queue between the feed and the runner.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Something that mutates the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Feed(FeedState),
    Fix(VehicleFix),
}

pub struct TrackingRunner {
    session: LineTrackingSession,
    events: mpsc::Receiver<SessionEvent>,
    snapshots: watch::Sender<TrackingSnapshot>,
}

impl TrackingRunner {
    pub fn new(
        session: LineTrackingSession,
        events: mpsc::Receiver<SessionEvent>,
        snapshots: watch::Sender<TrackingSnapshot>,
    ) -> Self {
        TrackingRunner {
            session,
            events,
            snapshots,
        }
    }

    /// Apply one event. Returns true when the snapshot changed.
    pub fn apply(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Feed(state) => self.session.on_feed_state(state),
            SessionEvent::Fix(fix) => self.session.on_fix(&fix),
        }
    }

    /// Drain the queue until every sender is gone, then hand the session back.
    pub async fn run(mut self) -> LineTrackingSession {
        while let Some(event) = self.events.recv().await {
            if self.apply(event) {
                self.snapshots.send_replace(self.session.snapshot());
            }
        }
        self.session
    }
}

/// A running line tracker: live feed plus runner task.
pub struct TrackingHandle {
    feed: LiveFeed,
    runner: JoinHandle<LineTrackingSession>,
    snapshots: watch::Receiver<TrackingSnapshot>,
}

impl TrackingHandle {
    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Close the feed. Idempotent.
    pub fn shutdown(&self) {
        self.feed.shutdown();
    }

    /// Shut down and wait for both tasks. Returns the final session state.
    pub async fn join(self) -> Option<LineTrackingSession> {
        self.feed.shutdown();
        self.feed.join().await;
        match self.runner.await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("tracking runner failed: {e}");
                None
            }
        }
    }
}

/// Fetch the station list, load it and start the live feed.
///
/// Route errors (empty list, unknown goal) and station fetch failures are
/// returned; feed failures only show up as a disconnected status.
pub async fn start_tracking(
    api: Arc<dyn LineApi>,
    line: LineRef,
    options: TrackingOptions,
) -> Result<TrackingHandle, ClientError> {
    let stops = api.fetch_stops(&line).await?;

    let mut session = LineTrackingSession::new(line.clone(), options);
    let visible = session.load_route(&stops)?.len();
    info!(line = %line.channel(), visible, "starting live feed");

    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    let runner = tokio::spawn(TrackingRunner::new(session, event_rx, snapshot_tx).run());
    let feed = LiveFeed::spawn(api, line, event_tx);

    Ok(TrackingHandle {
        feed,
        runner,
        snapshots: snapshot_rx,
    })
}

/// Feed saved socket messages, one per line, into `session`.
///
/// Blank and unreadable lines are skipped. Fixes without a timestamp are
/// stamped with the current time. Returns the number of messages read.
pub fn replay_messages<R: BufRead>(session: &mut LineTrackingSession, reader: R) -> u64 {
    let mut messages = 0u64;
    for line in reader.lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }
        messages += 1;
        for fix in protocol::decode_message(&line) {
            let at = fix.observed_at.unwrap_or_else(Utc::now);
            session.on_fix_at(&fix, at);
        }
    }
    messages
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
