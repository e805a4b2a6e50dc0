use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the publish loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishServiceConfig {
    /// Seconds between publish cycles (default: 10)
    pub publish_interval_secs: u64,

    /// Delay before retrying a failed connect (default: 10 seconds)
    pub connect_retry_delay_secs: u64,

    /// Maximum number of connect attempts per credential (default: 3)
    pub max_connect_attempts: u32,
}

impl Default for PublishServiceConfig {
    fn default() -> Self {
        Self {
            publish_interval_secs: 10,
            connect_retry_delay_secs: 10,
            max_connect_attempts: 3,
        }
    }
}

impl PublishServiceConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }
}
