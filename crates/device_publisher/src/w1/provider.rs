use common::domain::{DomainError, DomainResult, ReadOutcome, SensorHandle, SensorProvider};
use std::fs;
use std::path::PathBuf;

/// 1-Wire therm device family prefixes (DS18S20, DS1822, DS18B20,
/// MAX31850K, DS28EA00)
const W1_THERM_FAMILIES: [&str; 5] = ["10-", "22-", "28-", "3b-", "42-"];

/// Millidegree value a sensor reports before its first conversion finishes
const POWER_ON_RESET_MILLIDEGREES: i32 = 85_000;

/// Temperature provider backed by the kernel 1-Wire sysfs interface.
///
/// Each sensor appears as `<base>/<family>-<serial>/w1_slave`; the file
/// carries a CRC check line and the measured millidegrees:
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub struct W1SensorProvider {
    base_dir: PathBuf,
}

impl W1SensorProvider {
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from("/sys/bus/w1/devices"),
        }
    }

    /// Provider rooted at an alternate sysfs directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl Default for W1SensorProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProvider for W1SensorProvider {
    fn enumerate_sensors(&self) -> DomainResult<Vec<SensorHandle>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            // No 1-Wire bus present means no sensors, not a fault
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DomainError::SensorReadFailure(format!(
                    "enumerating {}: {}",
                    self.base_dir.display(),
                    e
                )))
            }
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DomainError::SensorReadFailure(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(serial) = strip_family_prefix(&name) else {
                continue;
            };
            handles.push(SensorHandle {
                id: serial.to_string(),
                device_path: entry.path(),
            });
        }

        // read_dir order is filesystem-dependent; keep enumeration stable
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(handles)
    }

    fn read_temperature(&self, handle: &SensorHandle) -> ReadOutcome {
        let slave_path = handle.device_path.join("w1_slave");
        let raw = match fs::read_to_string(&slave_path) {
            Ok(raw) => raw,
            Err(e) => return ReadOutcome::Failed(format!("{}: {}", slave_path.display(), e)),
        };
        parse_w1_slave(&raw)
    }
}

fn strip_family_prefix(name: &str) -> Option<&str> {
    W1_THERM_FAMILIES
        .iter()
        .find_map(|family| name.strip_prefix(family))
        .filter(|serial| !serial.is_empty())
}

/// Parse the two-line `w1_slave` format. CRC failure and the power-on reset
/// value both mean the sensor has not settled yet.
fn parse_w1_slave(raw: &str) -> ReadOutcome {
    let mut lines = raw.lines();
    let (Some(crc_line), Some(data_line)) = (lines.next(), lines.next()) else {
        return ReadOutcome::Failed(format!("malformed w1_slave output: {:?}", raw));
    };

    if !crc_line.trim_end().ends_with("YES") {
        return ReadOutcome::NotReady;
    }

    let Some((_, millis)) = data_line.rsplit_once("t=") else {
        return ReadOutcome::Failed(format!("missing t= in w1_slave output: {:?}", data_line));
    };

    let millidegrees: i32 = match millis.trim().parse() {
        Ok(value) => value,
        Err(e) => return ReadOutcome::Failed(format!("bad millidegree value {:?}: {}", millis, e)),
    };

    if millidegrees == POWER_ON_RESET_MILLIDEGREES {
        return ReadOutcome::NotReady;
    }

    ReadOutcome::Ready(f64::from(millidegrees) / 1000.0)
}
