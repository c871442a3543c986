use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Device;

/// Service configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub log_dir: PathBuf,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub rotation_check_interval: Duration,
    pub store_queue: usize,
    pub devices: Vec<Device>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = lookup("HEADCOUNT_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HEADCOUNT_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://headcount.db".to_string());

        let log_dir: PathBuf = lookup("HEADCOUNT_LOG_DIR")
            .unwrap_or_else(|| "logs".to_string())
            .into();

        let poll_interval = Duration::from_millis(positive(
            &lookup,
            "HEADCOUNT_POLL_INTERVAL_MS",
            1000,
        )?);
        let fetch_timeout = Duration::from_millis(positive(
            &lookup,
            "HEADCOUNT_FETCH_TIMEOUT_MS",
            2000,
        )?);
        let rotation_check_interval = Duration::from_secs(positive(
            &lookup,
            "HEADCOUNT_ROTATION_CHECK_SECS",
            60,
        )?);
        let store_queue = positive(&lookup, "HEADCOUNT_STORE_QUEUE", 256)? as usize;

        let devices = match lookup("HEADCOUNT_DEVICES") {
            Some(s) if !s.trim().is_empty() => parse_devices(&s)?,
            _ => Vec::new(),
        };

        Ok(Config {
            listen_addr,
            database_url,
            log_dir,
            poll_interval,
            fetch_timeout,
            rotation_check_interval,
            store_queue,
            devices,
        })
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(s) => match s.trim().parse::<u64>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(ConfigError::Invalid(var, "must be a positive integer")),
        },
    }
}

/// Parse a comma separated device list.
///
/// Expected format per entry: "host" or "user:password@host",
/// e.g. "admin:secret@10.0.0.5,10.0.0.6".
fn parse_devices(s: &str) -> Result<Vec<Device>, ConfigError> {
    let mut devices = Vec::new();
    for entry in s.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let device = match entry.rsplit_once('@') {
            Some((credentials, host)) => {
                let (user, password) = credentials.split_once(':').ok_or(ConfigError::Invalid(
                    "HEADCOUNT_DEVICES",
                    "expected format: user:password@host",
                ))?;
                Device::new(host).with_credentials(user, password)
            }
            None => Device::new(entry),
        };

        if device.id.is_empty() {
            return Err(ConfigError::Invalid(
                "HEADCOUNT_DEVICES",
                "device host must not be empty",
            ));
        }
        devices.push(device);
    }
    Ok(devices)
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
