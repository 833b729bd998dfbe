//! Network facts consumed by the detector and the scoring engine.
//!
//! Snapshots are supplied by an external source; the core never fetches
//! them itself and never mutates a caller's snapshot in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_firmware_updated() -> bool {
    true
}

fn default_security_score() -> u32 {
    100
}

/// One device on the observed network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Defaults lean safe so partial payloads do not fabricate findings
    #[serde(default = "default_firmware_updated")]
    pub firmware_updated: bool,
    #[serde(default = "default_security_score")]
    pub security_score: u32,
}

/// One observed connection between two devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub from_device: String,
    pub to_device: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub encrypted: bool,
}

/// Structured device/connection facts at one point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl NetworkSnapshot {
    /// Resolve a device id to its display name, falling back to the id
    pub fn device_name<'a>(&'a self, device_id: &'a str) -> &'a str {
        self.devices
            .iter()
            .find(|d| d.id == device_id)
            .map(|d| d.name.as_str())
            .unwrap_or(device_id)
    }

    pub fn find_device_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_falls_back_to_id() {
        let snapshot = NetworkSnapshot {
            captured_at: None,
            devices: vec![Device {
                id: "dev1".to_string(),
                name: "Router".to_string(),
                kind: "router".to_string(),
                firmware_updated: true,
                security_score: 90,
            }],
            connections: vec![],
        };
        assert_eq!(snapshot.device_name("dev1"), "Router");
        assert_eq!(snapshot.device_name("dev9"), "dev9");
    }

    #[test]
    fn test_partial_device_payload_defaults_safe() {
        let device: Device =
            serde_json::from_str(r#"{"id": "d1", "name": "Camera"}"#).unwrap();
        assert!(device.firmware_updated);
        assert_eq!(device.security_score, 100);
    }
}
