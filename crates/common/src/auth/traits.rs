use crate::auth::SignedToken;
use crate::domain::DomainResult;
use chrono::{DateTime, Utc};

/// Trait for issuing signed device credentials
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenProvider: Send + Sync {
    /// Issue a time-bounded signed token for this device's audience.
    ///
    /// Failure here is fatal to the current cycle: without a credential no
    /// progress is possible, so there is no retry at this layer.
    fn issue_token(&self, now: DateTime<Utc>) -> DomainResult<SignedToken>;
}
