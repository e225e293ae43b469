//! Live feed lifecycle state machine.
//!
//! `Idle → Negotiating → Connected → Disconnected`. `Disconnected` is
//! absorbing: a feed that lost its transport stays down, and reconnecting
//! means building a new feed. The driver that owns the actual socket reports
//! lifecycle inputs here and forwards the resulting state to the session.

use tracing::debug;

use crate::types::ConnectionStatus;

/// Lifecycle state of one live feed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedState {
    #[default]
    Idle,
    Negotiating,
    Connected,
    Disconnected,
}

impl FeedState {
    /// Status as the user sees it.
    pub fn status(self) -> ConnectionStatus {
        match self {
            FeedState::Idle | FeedState::Negotiating => ConnectionStatus::AwaitingConnection,
            FeedState::Connected => ConnectionStatus::Connected,
            FeedState::Disconnected => ConnectionStatus::Disconnected,
        }
    }
}

/// Things that happen to a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedInput {
    Start,
    NegotiationFailed,
    /// Transport open and control frames sent.
    TransportOpened,
    TransportFailed,
    TransportClosed,
    Shutdown,
}

/// Tracks the state of one feed and rejects transitions it cannot make.
#[derive(Debug, Default)]
pub struct FeedLifecycle {
    state: FeedState,
    shut_down: bool,
}

impl FeedLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FeedState {
        self.state
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Apply an input. Returns the new state when it changed.
    pub fn apply(&mut self, input: FeedInput) -> Option<FeedState> {
        use FeedInput::*;
        use FeedState::*;

        let next = match (self.state, input) {
            (_, Shutdown) => {
                self.shut_down = true;
                match self.state {
                    Negotiating | Connected => Disconnected,
                    other => other,
                }
            }
            _ if self.shut_down => self.state,
            (Idle, Start) => Negotiating,
            (Negotiating, TransportOpened) => Connected,
            (Negotiating, NegotiationFailed | TransportFailed | TransportClosed) => Disconnected,
            (Connected, TransportFailed | TransportClosed) => Disconnected,
            (state, input) => {
                debug!(?state, ?input, "ignoring feed transition");
                state
            }
        };

        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut feed = FeedLifecycle::new();
        assert_eq!(feed.state().status(), ConnectionStatus::AwaitingConnection);
        assert_eq!(feed.apply(FeedInput::Start), Some(FeedState::Negotiating));
        assert_eq!(feed.apply(FeedInput::TransportOpened), Some(FeedState::Connected));
        assert_eq!(feed.state().status(), ConnectionStatus::Connected);
        assert_eq!(feed.apply(FeedInput::TransportClosed), Some(FeedState::Disconnected));
    }

    #[test]
    fn test_negotiation_failure_disconnects() {
        let mut feed = FeedLifecycle::new();
        feed.apply(FeedInput::Start);
        assert_eq!(feed.apply(FeedInput::NegotiationFailed), Some(FeedState::Disconnected));
        assert_eq!(feed.state().status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_disconnected_is_absorbing() {
        let mut feed = FeedLifecycle::new();
        feed.apply(FeedInput::Start);
        feed.apply(FeedInput::TransportOpened);
        feed.apply(FeedInput::TransportFailed);
        assert_eq!(feed.apply(FeedInput::Start), None);
        assert_eq!(feed.apply(FeedInput::TransportOpened), None);
        assert_eq!(feed.state(), FeedState::Disconnected);
    }

    #[test]
    fn test_idle_cannot_disconnect() {
        let mut feed = FeedLifecycle::new();
        assert_eq!(feed.apply(FeedInput::TransportClosed), None);
        assert_eq!(feed.apply(FeedInput::TransportOpened), None);
        assert_eq!(feed.state(), FeedState::Idle);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let mut feed = FeedLifecycle::new();
        feed.apply(FeedInput::Start);
        feed.apply(FeedInput::TransportOpened);
        assert_eq!(feed.apply(FeedInput::Shutdown), Some(FeedState::Disconnected));
        assert_eq!(feed.apply(FeedInput::Shutdown), None);
        assert!(feed.is_shut_down());
    }

    #[test]
    fn test_shutdown_before_start() {
        let mut feed = FeedLifecycle::new();
        assert_eq!(feed.apply(FeedInput::Shutdown), None);
        assert_eq!(feed.apply(FeedInput::Start), None);
        assert_eq!(feed.state(), FeedState::Idle);
    }
}
