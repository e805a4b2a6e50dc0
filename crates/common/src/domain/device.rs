use crate::domain::result::{DomainError, DomainResult};

/// Identity of this device within its project and registry scope.
///
/// The broker authenticates the device against the project (the JWT
/// audience); the registry and device ids scope the telemetry topic and the
/// envelope's device scope string.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    pub project_id: String,
    pub registry_id: String,
    pub device_id: String,
}

impl DeviceIdentity {
    pub fn new(project_id: &str, registry_id: &str, device_id: &str) -> DomainResult<Self> {
        let project_id = project_id.trim();
        let registry_id = registry_id.trim();
        let device_id = device_id.trim();

        if project_id.is_empty() {
            return Err(DomainError::InvalidConfig(
                "Project ID cannot be empty".to_string(),
            ));
        }
        if registry_id.is_empty() {
            return Err(DomainError::InvalidConfig(
                "Registry ID cannot be empty".to_string(),
            ));
        }
        if device_id.is_empty() {
            return Err(DomainError::InvalidConfig(
                "Device ID cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            project_id: project_id.to_string(),
            registry_id: registry_id.to_string(),
            device_id: device_id.to_string(),
        })
    }

    /// Device scope string, e.g. `registry-A.device-7`
    pub fn device_scope(&self) -> String {
        format!("{}.{}", self.registry_id, self.device_id)
    }

    /// Telemetry topic for this device, fixed at session start
    pub fn event_topic(&self) -> String {
        format!("/devices/{}/events", self.device_id)
    }

    /// Audience claim for this device's credentials
    pub fn audience(&self) -> &str {
        &self.project_id
    }

    /// MQTT client id presented to the broker
    pub fn client_id(&self) -> String {
        format!("thermpub-{}", self.device_scope())
    }
}
