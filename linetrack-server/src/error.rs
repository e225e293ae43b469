//! Errors surfaced by the network client and CLI commands.

use linetrack_core::LineTrackError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("station list request failed: {0}")]
    Stops(String),
    #[error("token negotiation failed: {0}")]
    Negotiation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Tracking(#[from] LineTrackError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_error_passes_through() {
        let err: ClientError = LineTrackError::UnknownStation("501".into()).into();
        assert_eq!(err.to_string(), "unknown station id: 501");
    }

    #[test]
    fn test_stops_message() {
        let err = ClientError::Stops("HTTP 500".into());
        assert_eq!(err.to_string(), "station list request failed: HTTP 500");
    }
}
