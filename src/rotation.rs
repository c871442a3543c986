use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

use crate::clock::Clock;
use crate::error::SinkOpenError;
use crate::sink::LogSink;

/// Rotates the log sink whenever the local date moves past the active file's date.
///
/// Comparing dates instead of waiting for 00:00 means a late or skipped check
/// still rotates, just a little later.
pub struct RotationScheduler {
    sink: Arc<LogSink>,
    clock: Arc<dyn Clock>,
    check_interval: Duration,
    last_date: NaiveDate,
}

impl RotationScheduler {
    pub fn new(sink: Arc<LogSink>, clock: Arc<dyn Clock>, check_interval: Duration) -> Self {
        let last_date = sink.current_date();
        Self {
            sink,
            clock,
            check_interval,
            last_date,
        }
    }

    /// Rotate if the date changed since the last rotation. Returns whether it did.
    pub fn check_once(&mut self) -> Result<bool, SinkOpenError> {
        let today = self.clock.now().date();
        if today < self.last_date {
            tracing::warn!(
                "Clock reads {}, before the active log date {}; not rotating",
                today,
                self.last_date
            );
            return Ok(false);
        }
        if today == self.last_date {
            return Ok(false);
        }

        self.sink.rotate()?;
        self.last_date = today;
        Ok(true)
    }

    /// Check on a fixed interval until shutdown. A failed rotation ends the task.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SinkOpenError> {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            if let Err(e) = self.check_once() {
                tracing::error!("Log rotation failed: {}", e);
                return Err(e);
            }
        }

        tracing::info!("Rotation scheduler stopped");
        Ok(())
    }

    pub fn spawn(self) -> RotationHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        RotationHandle { shutdown, task }
    }
}

/// Control handle for a spawned [`RotationScheduler`].
pub struct RotationHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), SinkOpenError>>,
}

impl RotationHandle {
    /// Wait for the scheduler to end on its own, which only happens on failure.
    pub async fn join(&mut self) -> Result<Result<(), SinkOpenError>, JoinError> {
        (&mut self.task).await
    }

    pub async fn stop(self) -> Result<Result<(), SinkOpenError>, JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::manual::{at, ManualClock};
    use crate::models::{Device, EventKind, LogRecord};
    use crate::registry::DeviceRegistry;
    use crate::store::StoreForwarder;
    use std::fs;
    use tempfile::tempdir;

    fn setup(
        dir: &std::path::Path,
        start: &str,
    ) -> (Arc<ManualClock>, Arc<LogSink>, RotationScheduler) {
        let clock = Arc::new(ManualClock::new(at("2024-03-01", start)));
        let registry = Arc::new(
            DeviceRegistry::with_devices(vec![Device::new("A"), Device::new("B")]).unwrap(),
        );
        let sink = Arc::new(
            LogSink::open(dir, registry, clock.clone(), StoreForwarder::detached()).unwrap(),
        );
        let scheduler =
            RotationScheduler::new(sink.clone(), clock.clone(), Duration::from_millis(10));
        (clock, sink, scheduler)
    }

    #[test]
    fn test_no_rotation_within_day() {
        let dir = tempdir().unwrap();
        let (clock, _sink, mut scheduler) = setup(dir.path(), "00:00:00");

        assert!(!scheduler.check_once().unwrap());
        clock.set(at("2024-03-01", "23:59:59"));
        assert!(!scheduler.check_once().unwrap());
    }

    #[test]
    fn test_rotates_once_per_day() {
        let dir = tempdir().unwrap();
        let (clock, sink, mut scheduler) = setup(dir.path(), "23:59:00");

        clock.set(at("2024-03-02", "00:00:00"));
        assert!(scheduler.check_once().unwrap());
        assert!(!scheduler.check_once().unwrap());

        clock.set(at("2024-03-02", "00:00:59"));
        assert!(!scheduler.check_once().unwrap());

        assert_eq!(sink.current_path(), dir.path().join("log_2024-03-02.txt"));
        let content = fs::read_to_string(sink.current_path()).unwrap();
        assert_eq!(content, "Camera IPs:\nCamera 1 = A\nCamera 2 = B\n\n");
    }

    #[test]
    fn test_clock_stepping_back_does_not_reopen_previous_day() {
        let dir = tempdir().unwrap();
        let (clock, sink, mut scheduler) = setup(dir.path(), "23:59:50");
        sink.write(&LogRecord {
            timestamp: at("2024-03-01", "23:59:55"),
            device_id: "A".to_string(),
            kind: EventKind::Entered,
            entered_total: 1,
            exited_total: 0,
            occupancy: 1,
        })
        .unwrap();

        clock.set(at("2024-03-02", "00:00:05"));
        assert!(scheduler.check_once().unwrap());

        clock.set(at("2024-03-01", "23:59:58"));
        assert!(!scheduler.check_once().unwrap());
        clock.set(at("2024-03-02", "00:00:07"));
        assert!(!scheduler.check_once().unwrap());

        assert_eq!(sink.current_path(), dir.path().join("log_2024-03-02.txt"));
        let day_one = fs::read_to_string(dir.path().join("log_2024-03-01.txt")).unwrap();
        assert!(day_one.contains("23:59:55, Camera 1, person entered (Occupancy: 1)"));
    }

    #[test]
    fn test_late_check_still_rotates() {
        let dir = tempdir().unwrap();
        let (clock, sink, mut scheduler) = setup(dir.path(), "22:00:00");

        // The first check after midnight happens well past minute 0.
        clock.set(at("2024-03-02", "00:07:41"));
        assert!(scheduler.check_once().unwrap());
        assert_eq!(sink.current_path(), dir.path().join("log_2024-03-02.txt"));
    }

    #[test]
    fn test_skipped_days_rotate_to_current_date() {
        let dir = tempdir().unwrap();
        let (clock, sink, mut scheduler) = setup(dir.path(), "12:00:00");

        clock.set(at("2024-03-04", "03:00:00"));
        assert!(scheduler.check_once().unwrap());
        assert!(!dir.path().join("log_2024-03-02.txt").exists());
        assert_eq!(sink.current_path(), dir.path().join("log_2024-03-04.txt"));
    }

    #[test]
    fn test_rotation_failure_is_reported() {
        let dir = tempdir().unwrap();
        let (clock, sink, mut scheduler) = setup(dir.path(), "23:00:00");

        // A directory where the next file should go makes it impossible to create.
        fs::create_dir(dir.path().join("log_2024-03-02.txt")).unwrap();
        clock.set(at("2024-03-02", "00:01:00"));

        assert!(scheduler.check_once().is_err());
        assert_eq!(sink.current_path(), dir.path().join("log_2024-03-01.txt"));
    }

    #[tokio::test]
    async fn test_spawned_scheduler_rotates_and_stops() {
        let dir = tempdir().unwrap();
        let (clock, sink, scheduler) = setup(dir.path(), "23:59:59");

        let handle = scheduler.spawn();
        clock.set(at("2024-03-02", "00:00:01"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.current_path(), dir.path().join("log_2024-03-02.txt"));
        assert!(handle.stop().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_spawned_scheduler_ends_on_failure() {
        let dir = tempdir().unwrap();
        let (clock, _sink, scheduler) = setup(dir.path(), "23:00:00");
        fs::create_dir(dir.path().join("log_2024-03-02.txt")).unwrap();

        let mut handle = scheduler.spawn();
        clock.set(at("2024-03-02", "00:00:01"));

        let result = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
    }
}
