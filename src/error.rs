use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure to read counters from a device. Contained to one device for one tick.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {device} failed: {source}")]
    Http {
        device: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Device {device} returned HTTP {status}")]
    Status { device: String, status: u16 },

    #[error("Device {device} did not answer within {timeout:?}")]
    Timeout { device: String, timeout: Duration },

    #[error("Malformed response from {device}: {reason}")]
    Parse { device: String, reason: String },
}

/// Persistence-layer failure. Logged, never propagated to the poll loop.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The log artifact could not be created or its header written.
#[derive(Error, Debug)]
#[error("Cannot open log file {path}: {source}")]
pub struct SinkOpenError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Appending to an already open log artifact failed.
#[derive(Error, Debug)]
#[error("Failed to append to {path}: {source}")]
pub struct SinkError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Device already registered: {0}")]
    DuplicateDevice(String),

    #[error("Device id must not be empty")]
    EmptyId,
}
