use crate::auth::SignedToken;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Transport state of a telemetry session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// One authenticated, open connection to the broker, valid for the lifetime
/// of its credential.
///
/// Implementations should:
/// - Run the underlying network processing concurrently (started at open,
///   stopped at close)
/// - Deliver publishes with at-least-once semantics; duplicates are possible
///   and consumers must be idempotent
/// - Never reconnect on their own: reconnection needs a fresh credential and
///   is the orchestrator's decision
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetrySession: Send + Sync {
    /// Publish a payload to a topic with at-least-once delivery
    ///
    /// # Returns
    /// () once the publish is accepted for delivery, `PublishFailure` on a
    /// transport-level fault
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> DomainResult<()>;

    /// Stop network processing and release the connection. Idempotent:
    /// closing an already-closed session is a no-op.
    async fn close(&mut self);

    /// Instant at which this session must be renewed: credential expiry
    /// minus the configured safety margin
    fn expiry_deadline(&self) -> DateTime<Utc>;

    fn state(&self) -> SessionState;
}

/// Trait for opening authenticated, encrypted sessions to the broker
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionOpener: Send + Sync {
    /// Open a session scoped to `token`
    ///
    /// # Returns
    /// A connected session on success; `AuthRejected` when the broker refuses
    /// the credential, `ConnectFailure` on transport faults
    async fn open(&self, token: &SignedToken) -> DomainResult<Box<dyn TelemetrySession>>;
}
