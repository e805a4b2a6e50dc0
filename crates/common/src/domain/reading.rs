use crate::domain::result::{DomainError, DomainResult};
use tracing::debug;

/// Handle to a currently-available temperature sensor.
///
/// `device_path` is a provider-specific locator (for the sysfs provider it is
/// the sensor's device directory); callers treat it as opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorHandle {
    pub id: String,
    pub device_path: std::path::PathBuf,
}

/// A single valid temperature reading, degrees Celsius
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    pub temperature: f64,
}

/// Outcome of one temperature read attempt
#[derive(Debug)]
pub enum ReadOutcome {
    /// Sensor produced a temperature
    Ready(f64),
    /// Sensor has not settled yet; its reading is omitted this cycle
    NotReady,
    /// Real read fault; aborts the whole collection cycle
    Failed(String),
}

/// Trait for enumerating and reading local temperature sensors
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SensorProvider: Send + Sync {
    /// Enumerate all currently-available sensors. The list may change between
    /// cycles; callers must not cache it.
    fn enumerate_sensors(&self) -> DomainResult<Vec<SensorHandle>>;

    /// Attempt one temperature read for a sensor
    fn read_temperature(&self, handle: &SensorHandle) -> ReadOutcome;
}

/// Collect one cycle of readings from all currently-available sensors.
///
/// Sensors reporting `NotReady` are omitted from the result; enumeration
/// order is preserved for the rest. A `Failed` outcome or an enumeration
/// failure aborts the cycle with `SensorReadFailure`. An empty result is
/// legitimate and not an error.
pub fn collect_readings(provider: &dyn SensorProvider) -> DomainResult<Vec<Reading>> {
    let handles = provider.enumerate_sensors()?;
    let mut readings = Vec::with_capacity(handles.len());

    for handle in handles {
        match provider.read_temperature(&handle) {
            ReadOutcome::Ready(temperature) => readings.push(Reading {
                sensor_id: handle.id,
                temperature,
            }),
            ReadOutcome::NotReady => {
                debug!(sensor_id = %handle.id, "sensor not ready, skipping measure");
            }
            ReadOutcome::Failed(reason) => {
                return Err(DomainError::SensorReadFailure(format!(
                    "sensor {}: {}",
                    handle.id, reason
                )));
            }
        }
    }

    Ok(readings)
}
