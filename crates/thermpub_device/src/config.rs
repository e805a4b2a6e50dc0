use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Service name used in log output
    #[serde(default = "default_service_name")]
    pub service_name: String,

    // MQTT configuration
    /// Broker host
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    /// Broker TLS port
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// Path to the PEM trust anchor for the broker's TLS certificate
    #[serde(default = "default_ca_cert_path")]
    pub ca_cert_path: String,

    /// MQTT keep-alive interval in seconds
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Timeout for the connect handshake in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    // Device identity
    /// Project scope (JWT audience)
    #[serde(default = "default_project_id")]
    pub project_id: String,

    /// Registry scope
    #[serde(default = "default_registry_id")]
    pub registry_id: String,

    /// Device id within the registry
    #[serde(default = "default_device_id")]
    pub device_id: String,

    // Credential configuration
    /// Path to the PEM-encoded RSA private key
    #[serde(default = "default_private_key_path")]
    pub private_key_path: String,

    /// Credential lifetime in minutes (default: 60)
    #[serde(default = "default_token_lifetime_mins")]
    pub token_lifetime_mins: u64,

    /// Renewal safety margin in minutes (default: 1)
    #[serde(default = "default_renewal_margin_mins")]
    pub renewal_margin_mins: u64,

    // Publish loop configuration
    /// Seconds between publish cycles (default: 10)
    #[serde(default = "default_publish_interval_secs")]
    pub publish_interval_secs: u64,

    /// Delay before retrying a failed connect in seconds
    #[serde(default = "default_connect_retry_delay_secs")]
    pub connect_retry_delay_secs: u64,

    /// Maximum number of connect attempts per credential
    #[serde(default = "default_max_connect_attempts")]
    pub max_connect_attempts: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "thermpub-device".to_string()
}

// MQTT defaults
fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    8883
}

fn default_ca_cert_path() -> String {
    "/etc/thermpub/ca.pem".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    30
}

// Device identity defaults
fn default_project_id() -> String {
    "dev-project".to_string()
}

fn default_registry_id() -> String {
    "dev-registry".to_string()
}

fn default_device_id() -> String {
    "dev-device".to_string()
}

// Credential defaults
fn default_private_key_path() -> String {
    "/etc/thermpub/device_key.pem".to_string()
}

fn default_token_lifetime_mins() -> u64 {
    60
}

fn default_renewal_margin_mins() -> u64 {
    1
}

// Publish loop defaults
fn default_publish_interval_secs() -> u64 {
    10
}

fn default_connect_retry_delay_secs() -> u64 {
    10
}

fn default_max_connect_attempts() -> u32 {
    3
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("THERMPUB"))
            .build()?
            .try_deserialize()
    }
}
