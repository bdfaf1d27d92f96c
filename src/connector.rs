use crate::metrics::MetricsPayload;
use crate::model::config::{FeatureConfig, Segment};
use crate::model::enums::{Domain, Event};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Failure reported by a [`Connector`] implementation.
///
/// The `retryable` flag drives the caller's backoff policy: authentication
/// gives up on non-retryable failures, synchronization retries transient ones.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ConnectorError {
    /// The text representation of the failure.
    pub message: String,
    /// True when the failure is transient and the operation may be retried.
    pub retryable: bool,
}

impl ConnectorError {
    /// A transient failure (networking, 5xx, eventual-consistency 404).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A permanent failure (invalid credentials, malformed request).
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Session data produced by a successful authentication handshake.
///
/// The bearer credential itself stays inside the connector; the runtime only
/// needs the environment scoping for sync and metrics calls.
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    /// Identifier of the authenticated environment.
    pub environment: String,
    /// Cluster the environment is served from.
    pub cluster: String,
    /// Account owning the environment, when the credential carries one.
    pub account: Option<String>,
}

/// A single change notification pushed by the stream transport.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    /// The entity domain the change refers to.
    pub domain: Domain,
    /// The change event.
    pub event: Event,
    /// Identifier of the changed entity.
    pub identifier: String,
}

/// A long-lived sequence of server-pushed change notifications.
#[async_trait]
pub trait MessageStream: Send {
    /// Reads the next notification. Returns `Ok(None)` when the server closed
    /// the stream cleanly; an error signals a broken connection. Both cause the
    /// streamer to reconnect with backoff.
    async fn next_message(&mut self) -> Result<Option<Message>, ConnectorError>;
}

/// The transport used to reach the flag delivery service.
///
/// The runtime never talks HTTP itself; implementations own the wire protocol,
/// credentials, and marshalling.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs the authentication handshake.
    async fn authenticate(&self) -> Result<AuthInfo, ConnectorError>;

    /// Fetches the full authoritative flag set.
    async fn flags(&self) -> Result<Vec<FeatureConfig>, ConnectorError>;

    /// Fetches the full authoritative segment set.
    async fn segments(&self) -> Result<Vec<Segment>, ConnectorError>;

    /// Fetches a single flag by identifier.
    async fn flag(&self, identifier: &str) -> Result<FeatureConfig, ConnectorError>;

    /// Fetches a single segment by identifier.
    async fn segment(&self, identifier: &str) -> Result<Segment, ConnectorError>;

    /// Uploads one metrics payload, returning the response status code.
    async fn post_metrics(&self, payload: &MetricsPayload) -> Result<u16, ConnectorError>;

    /// Opens the server-push stream.
    async fn stream(&self) -> Result<Box<dyn MessageStream>, ConnectorError>;
}
