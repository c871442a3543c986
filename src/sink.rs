use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};

use crate::clock::Clock;
use crate::error::{SinkError, SinkOpenError};
use crate::models::{Device, LogRecord};
use crate::registry::DeviceRegistry;
use crate::store::StoreForwarder;

/// File name of the log artifact for a given day.
pub fn log_file_name(date: NaiveDate) -> String {
    format!("log_{}.txt", date.format("%Y-%m-%d"))
}

/// The artifact currently being appended to.
struct ActiveLog {
    date: NaiveDate,
    path: PathBuf,
    file: BufWriter<File>,
    /// Camera numbers for this file: position + 1.
    numbers: Vec<String>,
}

impl ActiveLog {
    fn create(dir: &Path, date: NaiveDate, roster: &[Device]) -> Result<Self, SinkOpenError> {
        let path = dir.join(log_file_name(date));
        let open_err = |source| SinkOpenError {
            path: path.clone(),
            source,
        };

        let mut file = BufWriter::new(File::create(&path).map_err(open_err)?);

        let mut header = String::from("Camera IPs:\n");
        for (i, device) in roster.iter().enumerate() {
            header.push_str(&format!("Camera {} = {}\n", i + 1, device.id));
        }
        header.push('\n');
        file.write_all(header.as_bytes()).map_err(open_err)?;
        file.flush().map_err(open_err)?;

        Ok(Self {
            date,
            path: path.clone(),
            file,
            numbers: roster.iter().map(|d| d.id.clone()).collect(),
        })
    }

    fn number_of(&self, device_id: &str) -> Option<usize> {
        self.numbers.iter().position(|id| id == device_id).map(|i| i + 1)
    }

    /// Number for a device, assigning the next free one (and announcing it) if needed.
    fn ensure_number(&mut self, device_id: &str, at: NaiveDateTime) -> std::io::Result<usize> {
        if let Some(n) = self.number_of(device_id) {
            return Ok(n);
        }
        self.numbers.push(device_id.to_string());
        let n = self.numbers.len();
        self.append(&added_line(at, n, device_id))?;
        Ok(n)
    }

    fn append(&mut self, line: &str) -> std::io::Result<()> {
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }

    fn sink_err(&self, source: std::io::Error) -> SinkError {
        SinkError {
            path: self.path.clone(),
            source,
        }
    }
}

fn added_line(at: NaiveDateTime, n: usize, device_id: &str) -> String {
    format!("{}, Camera {} = {} added\n", at.format("%H:%M:%S"), n, device_id)
}

fn record_line(record: &LogRecord, n: usize) -> String {
    format!(
        "{}, Camera {}, person {} (Occupancy: {})\n",
        record.timestamp.format("%H:%M:%S"),
        n,
        record.kind,
        record.occupancy
    )
}

/// Append-only daily log file, with write-through to the record store.
///
/// `write`, `note_device_added` and `rotate` all go through one mutex, so a
/// rotation never interleaves with a half-written line.
pub struct LogSink {
    dir: PathBuf,
    registry: Arc<DeviceRegistry>,
    clock: Arc<dyn Clock>,
    forwarder: StoreForwarder,
    active: Mutex<ActiveLog>,
}

impl LogSink {
    /// Create (or truncate) today's log file and write the current roster as header.
    pub fn open(
        dir: impl Into<PathBuf>,
        registry: Arc<DeviceRegistry>,
        clock: Arc<dyn Clock>,
        forwarder: StoreForwarder,
    ) -> Result<Self, SinkOpenError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SinkOpenError {
            path: dir.clone(),
            source,
        })?;

        let date = clock.now().date();
        let active = ActiveLog::create(&dir, date, &registry.snapshot())?;
        tracing::info!("Logging to {}", active.path.display());

        Ok(Self {
            dir,
            registry,
            clock,
            forwarder,
            active: Mutex::new(active),
        })
    }

    /// Append one record to the file, then hand it to the store.
    ///
    /// The store hand-off never blocks and never fails this call.
    pub fn write(&self, record: &LogRecord) -> Result<(), SinkError> {
        {
            let mut active = self.active.lock().unwrap();
            let n = active
                .ensure_number(&record.device_id, record.timestamp)
                .map_err(|e| active.sink_err(e))?;
            active
                .append(&record_line(record, n))
                .map_err(|e| active.sink_err(e))?;
        }

        self.forwarder.forward(record);
        Ok(())
    }

    /// Announce a device registered while this file is active. The header is not rewritten.
    ///
    /// A device that already has a number in this file is not announced again.
    pub fn note_device_added(&self, device: &Device) -> Result<(), SinkError> {
        let now = self.clock.now();
        let mut active = self.active.lock().unwrap();
        active
            .ensure_number(&device.id, now)
            .map(|_| ())
            .map_err(|e| active.sink_err(e))
    }

    /// Switch to the file for the clock's current date, re-emitting the roster.
    ///
    /// Only moves forward: does nothing if the clock's date is the active file's
    /// date or earlier. If the new file cannot be created, the old one stays
    /// active and the error is returned.
    pub fn rotate(&self) -> Result<(), SinkOpenError> {
        let date = self.clock.now().date();
        let mut active = self.active.lock().unwrap();
        if date < active.date {
            tracing::warn!(
                "Clock moved back to {}, keeping {}",
                date,
                active.path.display()
            );
            return Ok(());
        }
        if date == active.date {
            tracing::debug!("Log already on {}, not rotating", date);
            return Ok(());
        }

        let next = ActiveLog::create(&self.dir, date, &self.registry.snapshot())?;
        let mut previous = std::mem::replace(&mut *active, next);
        if let Err(e) = previous.file.flush() {
            tracing::warn!("Failed to flush {}: {}", previous.path.display(), e);
        }

        tracing::info!(
            "Rotated log from {} to {}",
            previous.path.display(),
            active.path.display()
        );
        Ok(())
    }

    pub fn current_date(&self) -> NaiveDate {
        self.active.lock().unwrap().date
    }

    pub fn current_path(&self) -> PathBuf {
        self.active.lock().unwrap().path.clone()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
