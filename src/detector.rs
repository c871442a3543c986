use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::models::{occupancy, DeviceState, EventKind, LogRecord};

/// Turns cumulative counter samples into discrete entered/exited records.
///
/// Each direction emits at most one record per sample, no matter how far the
/// counter moved since the previous one. A counter that went backwards (a reset
/// on the device) is adopted as the new baseline without emitting anything for
/// that direction.
#[derive(Debug, Default)]
pub struct DeltaDetector {
    state: HashMap<String, DeviceState>,
}

impl DeltaDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(
        &mut self,
        device_id: &str,
        entered_total: u64,
        exited_total: u64,
        now: NaiveDateTime,
    ) -> Vec<LogRecord> {
        let prev = self.baseline(device_id);
        let mut records = Vec::with_capacity(2);

        let record = |kind| LogRecord {
            timestamp: now,
            device_id: device_id.to_string(),
            kind,
            entered_total,
            exited_total,
            occupancy: occupancy(entered_total, exited_total),
        };

        if entered_total > prev.last_entered {
            records.push(record(EventKind::Entered));
        }
        if exited_total > prev.last_exited {
            records.push(record(EventKind::Exited));
        }

        if entered_total < prev.last_entered || exited_total < prev.last_exited {
            tracing::info!(
                device = %device_id,
                prev_entered = prev.last_entered,
                prev_exited = prev.last_exited,
                entered_total,
                exited_total,
                "Counter went backwards, adopting new baseline"
            );
        }

        self.state.insert(
            device_id.to_string(),
            DeviceState::new(entered_total, exited_total),
        );

        records
    }

    /// The current baseline, `(0, 0)` for a device never observed.
    pub fn baseline(&self, device_id: &str) -> DeviceState {
        self.state.get(device_id).copied().unwrap_or_default()
    }

    pub fn forget(&mut self, device_id: &str) {
        self.state.remove(device_id);
    }

    /// Keep only the devices for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.state.retain(|id, _| keep(id));
    }

    pub fn tracked(&self) -> usize {
        self.state.len()
    }
}
