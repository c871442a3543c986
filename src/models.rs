use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A networked occupancy counter, identified by its address.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub username: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Last observed cumulative counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub last_entered: u64,
    pub last_exited: u64,
}

impl DeviceState {
    pub fn new(last_entered: u64, last_exited: u64) -> Self {
        Self {
            last_entered,
            last_exited,
        }
    }
}

/// Direction of a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Entered,
    Exited,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Entered => "entered",
            EventKind::Exited => "exited",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected change, written once to the log file and once to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub device_id: String,
    pub kind: EventKind,
    pub entered_total: u64,
    pub exited_total: u64,
    pub occupancy: i64,
}

/// Occupancy implied by a pair of cumulative counters.
pub fn occupancy(entered: u64, exited: u64) -> i64 {
    counter_to_i64(entered).saturating_sub(counter_to_i64(exited))
}

/// Counter as a signed SQL integer, clamped at `i64::MAX`.
pub fn counter_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A row of the occupancy log table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub ts: String,
    pub device_id: String,
    pub kind: String,
    pub entered_total: i64,
    pub exited_total: i64,
    pub occupancy: i64,
}

/// Latest counters seen for one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCounts {
    pub device_id: String,
    pub entered: u64,
    pub exited: u64,
    pub occupancy: i64,
    pub updated_at: NaiveDateTime,
}

/// Request to register a device.
#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Response listing registered devices.
#[derive(Debug, Serialize)]
pub struct GetDevicesResponse {
    pub devices: Vec<Device>,
}

/// Response for the counts endpoint.
#[derive(Debug, Serialize)]
pub struct GetCountsResponse {
    pub devices: Vec<DeviceCounts>,
    pub total_entered: u64,
    pub total_exited: u64,
    pub total_occupancy: i64,
}

/// Query parameters for log endpoint.
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub after_id: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Response for log endpoint.
#[derive(Debug, Serialize)]
pub struct GetLogResponse {
    pub after_id: i64,
    pub limit: i64,
    pub max_id: i64,
    pub has_more: bool,
    pub entries: Vec<StoredRecord>,
}
