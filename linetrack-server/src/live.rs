//! Live vehicle feed over the real-time WebSocket transport.
//!
//! One [`LiveFeed`] is one connection attempt: negotiate a token, open the
//! socket, send the handshake and join frames, then forward decoded fixes to
//! the runner until the transport goes away or the feed is shut down. There
//! is no reconnection.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use linetrack_core::feed::{FeedInput, FeedLifecycle};
use linetrack_core::protocol;
use linetrack_core::types::LineRef;

use crate::api::LineApi;
use crate::runner::SessionEvent;

/// Handle to a spawned feed task.
pub struct LiveFeed {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LiveFeed {
    /// Start negotiating for `line`; lifecycle changes and fixes go to `events`.
    pub fn spawn(
        api: Arc<dyn LineApi>,
        line: LineRef,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_feed(api, line, events, shutdown_rx));
        LiveFeed { shutdown, task }
    }

    /// Ask the feed to close. Safe to call repeatedly, before or after the
    /// transport ever opened.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait for the feed task to end.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("live feed task failed: {e}");
        }
    }
}

/// Resolves once shutdown was requested or the handle was dropped.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Drives a [`FeedLifecycle`] and reports every state change to the runner.
struct FeedDriver {
    lifecycle: FeedLifecycle,
    events: mpsc::Sender<SessionEvent>,
}

impl FeedDriver {
    /// Returns false once the runner is gone.
    async fn advance(&mut self, input: FeedInput) -> bool {
        match self.lifecycle.apply(input) {
            Some(state) => self.events.send(SessionEvent::Feed(state)).await.is_ok(),
            None => !self.events.is_closed(),
        }
    }

    async fn forward(&mut self, text: &str) -> bool {
        for fix in protocol::decode_message(text) {
            trace!(vehicle = %fix.vehicle_id, position = %fix.location, "fix");
            if self.events.send(SessionEvent::Fix(fix)).await.is_err() {
                return false;
            }
        }
        true
    }
}

async fn run_feed(
    api: Arc<dyn LineApi>,
    line: LineRef,
    events: mpsc::Sender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut driver = FeedDriver {
        lifecycle: FeedLifecycle::new(),
        events,
    };

    if !driver.advance(FeedInput::Start).await {
        return;
    }

    let token = tokio::select! {
        result = api.negotiate() => result,
        _ = shutdown_requested(&mut shutdown) => {
            driver.advance(FeedInput::Shutdown).await;
            return;
        }
    };
    let url = match token.and_then(|token| api.vehicles_url(&token)) {
        Ok(url) => url,
        Err(e) => {
            warn!(line = %line.channel(), "{e}");
            driver.advance(FeedInput::NegotiationFailed).await;
            return;
        }
    };

    let connected = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
        _ = shutdown_requested(&mut shutdown) => {
            driver.advance(FeedInput::Shutdown).await;
            return;
        }
    };
    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(e) => {
            warn!(line = %line.channel(), "transport connect failed: {e}");
            driver.advance(FeedInput::TransportFailed).await;
            return;
        }
    };

    let (mut write, mut read) = socket.split();
    for frame in protocol::control_frames(&line) {
        if let Err(e) = write.send(Message::Text(frame)).await {
            warn!(line = %line.channel(), "sending control frame failed: {e}");
            driver.advance(FeedInput::TransportFailed).await;
            return;
        }
    }
    info!(line = %line.channel(), "live feed connected");
    if !driver.advance(FeedInput::TransportOpened).await {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => {
                let _ = write.send(Message::Close(None)).await;
                driver.advance(FeedInput::Shutdown).await;
                break;
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) if text.is_empty() => {
                        debug!("empty message, treating as close");
                        driver.advance(FeedInput::TransportClosed).await;
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        if !driver.forward(&text).await {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "transport closed by peer");
                        driver.advance(FeedInput::TransportClosed).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(line = %line.channel(), "transport error: {e}");
                        driver.advance(FeedInput::TransportFailed).await;
                        break;
                    }
                    None => {
                        driver.advance(FeedInput::TransportClosed).await;
                        break;
                    }
                }
            }
        }
    }
    info!(line = %line.channel(), "live feed ended");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use linetrack_core::feed::FeedState;
    use linetrack_core::types::StopRecord;
    use serde_json::json;
    use tokio::net::TcpListener;

    use crate::error::ClientError;

    /// Hands out a fixed token and points the transport at a local socket.
    struct LocalApi {
        addr: String,
        token: Option<&'static str>,
    }

    #[async_trait]
    impl LineApi for LocalApi {
        async fn fetch_stops(&self, _line: &LineRef) -> Result<Vec<StopRecord>, ClientError> {
            Ok(Vec::new())
        }

        async fn negotiate(&self) -> Result<String, ClientError> {
            self.token
                .map(str::to_string)
                .ok_or_else(|| ClientError::Negotiation("no token".into()))
        }

        fn vehicles_url(&self, token: &str) -> Result<String, ClientError> {
            crate::api::vehicles_url(&format!("ws://{}/vehicles", self.addr), token)
        }
    }

    async fn collect(mut rx: mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    fn states(events: &[SessionEvent]) -> Vec<FeedState> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Feed(state) => Some(*state),
                SessionEvent::Fix(_) => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_negotiation_failure() {
        let api = Arc::new(LocalApi {
            addr: "127.0.0.1:1".into(),
            token: None,
        });
        let (tx, rx) = mpsc::channel(16);
        let feed = LiveFeed::spawn(api, LineRef::new("1", "1"), tx);
        let events = collect(rx).await;
        feed.join().await;
        assert_eq!(
            states(&events),
            [FeedState::Negotiating, FeedState::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_after_negotiation() {
        let api = Arc::new(LocalApi {
            addr: "127.0.0.1:1".into(),
            token: Some("tok"),
        });
        let (tx, rx) = mpsc::channel(16);
        let feed = LiveFeed::spawn(api, LineRef::new("1", "1"), tx);
        let events = collect(rx).await;
        feed.join().await;
        assert_eq!(
            states(&events),
            [FeedState::Negotiating, FeedState::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_empty_message_closes_feed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let mut control = 0;
            while control < 2 {
                match ws.next().await {
                    Some(Ok(Message::Text(_))) => control += 1,
                    Some(Ok(_)) => {}
                    _ => return,
                }
            }
            ws.send(Message::Text(String::new())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let api = Arc::new(LocalApi {
            addr,
            token: Some("tok"),
        });
        let (tx, rx) = mpsc::channel(16);
        let feed = LiveFeed::spawn(api, LineRef::new("1", "1"), tx);
        let events = collect(rx).await;
        feed.join().await;
        server.await.unwrap();

        assert_eq!(
            states(&events),
            [
                FeedState::Negotiating,
                FeedState::Connected,
                FeedState::Disconnected
            ]
        );
        assert!(events.iter().all(|e| matches!(e, SessionEvent::Feed(_))));
    }

    #[tokio::test]
    async fn test_streams_fixes_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let mut received = Vec::new();
            while received.len() < 2 {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => received.push(text),
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }

            let payload = json!({"VJourneyId": 42, "Latitude": 49.41, "Longitude": 2.82});
            let frame = json!({
                "type": 1,
                "target": "VehiclePosition",
                "arguments": ["#lineId:1234:1", payload.to_string()],
            });
            let garbage = format!("not json{}", protocol::RECORD_SEPARATOR);
            ws.send(Message::Text(garbage)).await.unwrap();
            ws.send(Message::Text(format!("{frame}{}", protocol::RECORD_SEPARATOR)))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
            received
        });

        let api = Arc::new(LocalApi {
            addr,
            token: Some("tok"),
        });
        let (tx, rx) = mpsc::channel(16);
        let line = LineRef::new("1234", "1");
        let feed = LiveFeed::spawn(api, line.clone(), tx);
        let events = collect(rx).await;
        feed.join().await;

        let received = server.await.unwrap();
        assert_eq!(received, protocol::control_frames(&line));

        assert_eq!(
            states(&events),
            [
                FeedState::Negotiating,
                FeedState::Connected,
                FeedState::Disconnected
            ]
        );
        let fixes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Fix(fix) => Some(fix),
                SessionEvent::Feed(_) => None,
            })
            .collect();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].vehicle_id, "42");
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    break;
                }
            }
        });

        let api = Arc::new(LocalApi {
            addr,
            token: Some("tok"),
        });
        let (tx, mut rx) = mpsc::channel(16);
        let feed = LiveFeed::spawn(api, LineRef::new("1", "1"), tx);

        assert_eq!(rx.recv().await, Some(SessionEvent::Feed(FeedState::Negotiating)));
        assert_eq!(rx.recv().await, Some(SessionEvent::Feed(FeedState::Connected)));

        feed.shutdown();
        feed.shutdown();
        assert_eq!(rx.recv().await, Some(SessionEvent::Feed(FeedState::Disconnected)));
        assert_eq!(rx.recv().await, None);

        feed.shutdown();
        feed.join().await;
        server.await.unwrap();
    }
}
