use crate::domain::{PublishService, PublishServiceConfig};
use crate::mqtt::{MqttSessionConfig, MqttSessionOpener};
use crate::w1::W1SensorProvider;
use common::auth::{JwtConfig, JwtTokenProvider};
use common::domain::DeviceIdentity;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DevicePublisherConfig {
    pub jwt: JwtConfig,
    pub mqtt: MqttSessionConfig,
    pub publish: PublishServiceConfig,
}

/// Wires the publish loop to its real collaborators: RS256 credentials,
/// the TLS MQTT opener, and the sysfs 1-Wire sensor provider.
pub struct DevicePublisher {
    service: PublishService,
}

impl DevicePublisher {
    pub fn new(identity: DeviceIdentity, config: DevicePublisherConfig) -> Self {
        debug!(device_scope = %identity.device_scope(), "initializing device publisher");

        let token_provider = Arc::new(JwtTokenProvider::new(config.jwt));
        let session_opener = Arc::new(MqttSessionOpener::new(identity.clone(), config.mqtt));
        let sensor_provider = Arc::new(W1SensorProvider::new());

        let service = PublishService::new(
            identity,
            token_provider,
            session_opener,
            sensor_provider,
            config.publish,
        );

        Self { service }
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new({
            let service = self.service;
            move |ctx| {
                Box::pin(async move {
                    service.run(ctx).await?;
                    Ok(())
                })
            }
        })
    }
}
