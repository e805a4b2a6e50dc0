use async_trait::async_trait;
use common::auth::SignedToken;
use common::domain::{DeviceIdentity, DomainError, DomainResult, SessionOpener, TelemetrySession};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet,
    TlsConfiguration, Transport,
};
use std::time::Duration;
use tracing::{debug, info};

use crate::mqtt::MqttTelemetrySession;

/// Configuration for opening MQTT sessions
#[derive(Debug, Clone)]
pub struct MqttSessionConfig {
    /// Broker host
    pub broker_host: String,

    /// Broker TLS port
    pub broker_port: u16,

    /// Path to the PEM trust anchor for the broker's TLS certificate
    pub ca_cert_path: String,

    /// MQTT keep-alive interval in seconds (default: 30)
    pub keep_alive_secs: u64,

    /// Timeout for the connect handshake in seconds (default: 30)
    pub connect_timeout_secs: u64,

    /// Safety margin subtracted from credential expiry so the credential
    /// never expires mid-connection (default: 1 minute)
    pub renewal_margin_mins: u64,
}

impl Default for MqttSessionConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 8883,
            ca_cert_path: "/etc/thermpub/ca.pem".to_string(),
            keep_alive_secs: 30,
            connect_timeout_secs: 30,
            renewal_margin_mins: 1,
        }
    }
}

impl MqttSessionConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn renewal_margin(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.renewal_margin_mins as i64)
    }
}

/// Opens TLS MQTT sessions authenticated with a signed device credential
pub struct MqttSessionOpener {
    identity: DeviceIdentity,
    config: MqttSessionConfig,
}

impl MqttSessionOpener {
    pub fn new(identity: DeviceIdentity, config: MqttSessionConfig) -> Self {
        Self { identity, config }
    }
}

#[async_trait]
impl SessionOpener for MqttSessionOpener {
    async fn open(&self, token: &SignedToken) -> DomainResult<Box<dyn TelemetrySession>> {
        let ca = std::fs::read(&self.config.ca_cert_path).map_err(|e| {
            DomainError::ConnectFailure(format!(
                "trust anchor {}: {}",
                self.config.ca_cert_path, e
            ))
        })?;

        let client_id = self.identity.client_id();
        let mut mqtt_options = MqttOptions::new(
            &client_id,
            &self.config.broker_host,
            self.config.broker_port,
        );
        mqtt_options.set_keep_alive(self.config.keep_alive());
        mqtt_options.set_clean_session(true);
        // Brokers that authenticate with short-lived credentials read the JWT
        // from the password field; the username is not evaluated
        mqtt_options.set_credentials("unused", &token.jwt);
        mqtt_options.set_transport(Transport::Tls(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);

        debug!(client_id = %client_id, broker = %self.config.broker_host, "connecting");
        tokio::time::timeout(self.config.connect_timeout(), wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                DomainError::ConnectFailure(format!(
                    "timed out after {:?} waiting for CONNACK",
                    self.config.connect_timeout()
                ))
            })??;

        info!(client_id = %client_id, broker = %self.config.broker_host, "connected to MQTT broker");

        let expiry_deadline = token.expires_at - self.config.renewal_margin();
        Ok(Box::new(MqttTelemetrySession::start(
            client,
            eventloop,
            expiry_deadline,
        )))
    }
}

/// Drive the event loop until the broker acknowledges the connection
async fn wait_for_connack(eventloop: &mut EventLoop) -> DomainResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(connack_error(code)),
                };
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => return Err(connack_error(code)),
            Err(e) => return Err(DomainError::ConnectFailure(e.to_string())),
        }
    }
}

/// Classify a refused CONNACK: credential problems trigger re-issuance one
/// layer up, everything else is a transport fault eligible for retry
fn connack_error(code: ConnectReturnCode) -> DomainError {
    match code {
        ConnectReturnCode::RefusedProtocolVersion
        | ConnectReturnCode::BadClientId
        | ConnectReturnCode::ServiceUnavailable => {
            DomainError::ConnectFailure(format!("broker refused connection: {:?}", code))
        }
        ConnectReturnCode::Success => {
            DomainError::ConnectFailure("unexpected CONNACK return code".to_string())
        }
        // NotAuthorized and bad-credential return codes
        code => DomainError::AuthRejected(format!("{:?}", code)),
    }
}
