//! Registry of units that announced themselves with a version banner

use std::collections::BTreeMap;
use std::fmt::Write;

use dsp_protocol::{DeviceId, DeviceType, VersionBanner};
use tracing::info;

/// Identity of one unit on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfoRecord {
    /// Model
    pub device_type: DeviceType,
    /// Unit id
    pub device_id: DeviceId,
    /// Firmware version as reported
    pub version: String,
}

/// Units seen so far, keyed by device key
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceInfoRecord>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a banner, replacing any earlier record for the same key
    pub fn record(&mut self, banner: VersionBanner) -> DeviceInfoRecord {
        let record = DeviceInfoRecord {
            device_type: banner.device_type,
            device_id: banner.device_id,
            version: banner.version,
        };

        match self.devices.insert(banner.key.clone(), record.clone()) {
            Some(old) if old.version != record.version => info!(
                "Device {} firmware changed: {} -> {}",
                banner.key, old.version, record.version
            ),
            Some(_) => {}
            None => info!(
                "Found device {}: {} firmware {}",
                banner.key, record.device_type, record.version
            ),
        }

        record
    }

    /// Record for a device key
    pub fn get(&self, key: &str) -> Option<&DeviceInfoRecord> {
        self.devices.get(key)
    }

    /// Number of known units
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no unit has been seen
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Known units in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceInfoRecord)> {
        self.devices.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Operator listing of every known unit
    pub fn report(&self) -> String {
        let mut out = String::from("Devices:\n");
        for (key, record) in &self.devices {
            // Writing to a String cannot fail
            let _ = writeln!(out, "  Device: {}", key);
            let _ = writeln!(out, "    Model:     {}", record.device_type);
            let _ = writeln!(out, "    Id:        {}", record.device_id);
            let _ = writeln!(out, "    Firmware:  {}", record.version);
        }
        out
    }
}
