//! HTTP side of the transit API: station list fetch and token negotiation.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use linetrack_core::config::ApiConfig;
use linetrack_core::protocol;
use linetrack_core::types::{LineRef, StopRecord};

use crate::error::ClientError;

/// Endpoints a tracking session talks to.
#[async_trait]
pub trait LineApi: Send + Sync {
    /// Ordered station list of one line direction.
    async fn fetch_stops(&self, line: &LineRef) -> Result<Vec<StopRecord>, ClientError>;

    /// Obtain a session token for the real-time transport.
    async fn negotiate(&self) -> Result<String, ClientError>;

    /// WebSocket URL carrying `token`.
    fn vehicles_url(&self, token: &str) -> Result<String, ClientError>;
}

/// reqwest client for the Cityway map and vehicle hub endpoints.
#[derive(Clone)]
pub struct CitywayApi {
    endpoints: ApiConfig,
    client: reqwest::Client,
}

impl CitywayApi {
    pub fn new(endpoints: ApiConfig) -> Self {
        CitywayApi {
            endpoints,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LineApi for CitywayApi {
    async fn fetch_stops(&self, line: &LineRef) -> Result<Vec<StopRecord>, ClientError> {
        let response = self
            .client
            .get(&self.endpoints.stops_url)
            .query(&[
                ("Line", line.line_id.as_str()),
                ("Direction", line.direction.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ClientError::Stops(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Stops(e.to_string()))?;
        let stops = protocol::parse_stops(&body).map_err(|e| ClientError::Stops(e.to_string()))?;
        debug!(line = %line.channel(), count = stops.len(), "fetched station list");
        Ok(stops)
    }

    async fn negotiate(&self) -> Result<String, ClientError> {
        let body: Value = self
            .client
            .post(&self.endpoints.negotiate_url)
            .body("")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ClientError::Negotiation(e.to_string()))?
            .json()
            .await
            .map_err(|e| ClientError::Negotiation(e.to_string()))?;

        protocol::parse_token(&body)
            .ok_or_else(|| ClientError::Negotiation("response carries no connection token".into()))
    }

    fn vehicles_url(&self, token: &str) -> Result<String, ClientError> {
        vehicles_url(&self.endpoints.vehicles_url, token)
    }
}

/// Append `id=<token>` to the transport base URL.
pub fn vehicles_url(base: &str, token: &str) -> Result<String, ClientError> {
    let mut url = Url::parse(base).map_err(|e| ClientError::Transport(e.to_string()))?;
    url.query_pairs_mut().append_pair("id", token);
    Ok(url.into())
}
