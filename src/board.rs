use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDateTime;

use crate::models::{occupancy, Device, DeviceCounts, GetCountsResponse};

/// Latest counters per device, as last seen by the poll loop.
///
/// A device that fails to answer keeps its last known counts.
#[derive(Default)]
pub struct OccupancyBoard {
    latest: RwLock<HashMap<String, DeviceCounts>>,
}

impl OccupancyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, device_id: &str, entered: u64, exited: u64, at: NaiveDateTime) {
        let counts = DeviceCounts {
            device_id: device_id.to_string(),
            entered,
            exited,
            occupancy: occupancy(entered, exited),
            updated_at: at,
        };
        self.latest
            .write()
            .unwrap()
            .insert(device_id.to_string(), counts);
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceCounts> {
        self.latest.read().unwrap().get(device_id).cloned()
    }

    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.latest.write().unwrap().retain(|id, _| keep(id));
    }

    /// Per-device counts in roster order, plus totals over those devices.
    ///
    /// Devices that have never answered are left out of both.
    pub fn summary(&self, roster: &[Device]) -> GetCountsResponse {
        let latest = self.latest.read().unwrap();
        let devices: Vec<DeviceCounts> = roster
            .iter()
            .filter_map(|d| latest.get(&d.id).cloned())
            .collect();

        GetCountsResponse {
            total_entered: devices.iter().fold(0u64, |acc, c| acc.saturating_add(c.entered)),
            total_exited: devices.iter().fold(0u64, |acc, c| acc.saturating_add(c.exited)),
            total_occupancy: devices
                .iter()
                .fold(0i64, |acc, c| acc.saturating_add(c.occupancy)),
            devices,
        }
    }
}
