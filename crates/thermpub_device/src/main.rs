mod config;

use common::auth::JwtConfig;
use common::domain::DeviceIdentity;
use common::telemetry::{init_telemetry, TelemetryConfig};
use config::ServiceConfig;
use device_publisher::domain::PublishServiceConfig;
use device_publisher::mqtt::MqttSessionConfig;
use device_publisher::{DevicePublisher, DevicePublisherConfig};
use thermpub_runner::Runner;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: config.service_name.clone(),
        log_level: config.log_level.clone(),
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        broker = %config.mqtt_host,
        port = config.mqtt_port,
        "starting thermpub device publisher"
    );
    debug!("Configuration: {:?}", config);

    let identity = match DeviceIdentity::new(
        &config.project_id,
        &config.registry_id,
        &config.device_id,
    ) {
        Ok(identity) => identity,
        Err(e) => {
            error!("Invalid device identity: {}", e);
            std::process::exit(1);
        }
    };

    let publisher_config = DevicePublisherConfig {
        jwt: JwtConfig::new(
            config.private_key_path.clone(),
            identity.audience().to_string(),
            config.token_lifetime_mins,
        ),
        mqtt: MqttSessionConfig {
            broker_host: config.mqtt_host.clone(),
            broker_port: config.mqtt_port,
            ca_cert_path: config.ca_cert_path.clone(),
            keep_alive_secs: config.mqtt_keep_alive_secs,
            connect_timeout_secs: config.connect_timeout_secs,
            renewal_margin_mins: config.renewal_margin_mins,
        },
        publish: PublishServiceConfig {
            publish_interval_secs: config.publish_interval_secs,
            connect_retry_delay_secs: config.connect_retry_delay_secs,
            max_connect_attempts: config.max_connect_attempts,
        },
    };
    let publisher = DevicePublisher::new(identity, publisher_config);

    let code = Runner::new()
        .with_named_process("device_publisher", publisher.into_runner_process())
        .run()
        .await;

    std::process::exit(code);
}
