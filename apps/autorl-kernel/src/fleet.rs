// [[AUTORL]]/apps/autorl-kernel/src/fleet.rs
// Purpose: Registry of demo devices and their busy/idle state.
// Architecture: Runtime Support
// Dependencies: DashMap, Models

use dashmap::DashMap;

use crate::models::{DeviceInfo, DeviceStatus, Platform};

/// Device the mock phone stands in for.
pub const DEMO_DEVICE_ID: &str = "emulator-5554";

pub struct DeviceFleet {
    devices: DashMap<String, DeviceInfo>,
}

impl DeviceFleet {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    pub fn with_demo_devices() -> Self {
        let fleet = Self::new();
        fleet.add(DEMO_DEVICE_ID, Platform::Android, false);
        fleet.add("iPhone 15", Platform::Ios, false);
        fleet.add("emulator-5556", Platform::Android, false);
        fleet
    }

    pub fn add(&self, id: &str, platform: Platform, is_real: bool) {
        tracing::info!("Registering device {} ({:?}, real={})", id, platform, is_real);
        self.devices.insert(
            id.to_string(),
            DeviceInfo {
                id: id.to_string(),
                platform,
                is_real,
                status: DeviceStatus::Idle,
                current_task: None,
            },
        );
    }

    pub fn list(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub fn get(&self, id: &str) -> Option<DeviceInfo> {
        self.devices.get(id).map(|d| d.value().clone())
    }

    pub fn mark_running(&self, id: &str, task: &str) {
        if let Some(mut device) = self.devices.get_mut(id) {
            device.status = DeviceStatus::Running;
            device.current_task = Some(task.to_string());
        } else {
            tracing::warn!("Cannot mark unknown device {} as running", id);
        }
    }

    pub fn mark_idle(&self, id: &str) {
        if let Some(mut device) = self.devices.get_mut(id) {
            device.status = DeviceStatus::Idle;
            device.current_task = None;
        }
    }
}

impl Default for DeviceFleet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_devices_start_idle() {
        let fleet = DeviceFleet::with_demo_devices();
        let devices = fleet.list();
        assert_eq!(devices.len(), 3);
        assert!(devices.iter().all(|d| d.status == DeviceStatus::Idle));
        assert_eq!(fleet.get("iPhone 15").unwrap().platform, Platform::Ios);
    }

    #[test]
    fn test_mark_running_and_idle() {
        let fleet = DeviceFleet::with_demo_devices();
        fleet.mark_running(DEMO_DEVICE_ID, "run-1");

        let device = fleet.get(DEMO_DEVICE_ID).unwrap();
        assert_eq!(device.status, DeviceStatus::Running);
        assert_eq!(device.current_task.as_deref(), Some("run-1"));

        fleet.mark_idle(DEMO_DEVICE_ID);
        assert_eq!(fleet.get(DEMO_DEVICE_ID).unwrap().status, DeviceStatus::Idle);

        // unknown ids are ignored
        fleet.mark_running("ghost", "run-2");
        assert!(fleet.get("ghost").is_none());
    }
}
