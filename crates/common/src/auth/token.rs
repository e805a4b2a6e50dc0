use chrono::{DateTime, Utc};

/// Short-lived signed credential authenticating one session to the broker.
///
/// Exclusively owned by the session it authenticates and never reused after
/// that session closes.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedToken {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub audience: String,
    /// Compact JWS form presented to the broker as the connection password
    pub jwt: String,
}
