use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::board::OccupancyBoard;
use crate::client::DeviceClient;
use crate::clock::Clock;
use crate::detector::DeltaDetector;
use crate::error::FetchError;
use crate::models::Device;
use crate::registry::DeviceRegistry;
use crate::sink::LogSink;

/// Statistics from one pass over the registry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub devices_polled: usize,
    pub devices_failed: usize,
    pub records_written: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Stopped,
}

/// Polls every registered device once per tick and logs what changed.
///
/// Owns the delta detector; nothing else touches per-device baselines.
pub struct PollLoop<C: DeviceClient> {
    registry: Arc<DeviceRegistry>,
    client: Arc<C>,
    sink: Arc<LogSink>,
    board: Arc<OccupancyBoard>,
    clock: Arc<dyn Clock>,
    detector: DeltaDetector,
    /// Registration sequence each baseline belongs to.
    generations: HashMap<String, u64>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl<C: DeviceClient + 'static> PollLoop<C> {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        client: Arc<C>,
        sink: Arc<LogSink>,
        board: Arc<OccupancyBoard>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            sink,
            board,
            clock,
            detector: DeltaDetector::new(),
            generations: HashMap::new(),
            interval,
            fetch_timeout,
        }
    }

    /// Poll every registered device once.
    pub async fn tick(&mut self) -> TickStats {
        self.poll_devices(None).await
    }

    pub fn detector(&self) -> &DeltaDetector {
        &self.detector
    }

    async fn poll_devices(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> TickStats {
        let mut stats = TickStats::default();
        let registrations = self.registry.registrations();

        // Drop baselines of devices that were removed, or removed and re-added.
        let current: HashMap<&str, u64> = registrations
            .iter()
            .map(|r| (r.device.id.as_str(), r.seq))
            .collect();
        let detector = &mut self.detector;
        self.generations.retain(|id, seq| {
            let keep = current.get(id.as_str()).copied() == Some(*seq);
            if !keep {
                detector.forget(id);
            }
            keep
        });
        self.board.retain(|id| current.contains_key(id));

        for registration in &registrations {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!("Shutdown requested, ending tick early");
                break;
            }
            self.generations
                .entry(registration.device.id.clone())
                .or_insert(registration.seq);
            self.poll_device(&registration.device, &mut stats).await;
        }

        stats
    }

    async fn poll_device(&mut self, device: &Device, stats: &mut TickStats) {
        let fetched = match timeout(self.fetch_timeout, self.client.fetch(device)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                device: device.id.clone(),
                timeout: self.fetch_timeout,
            }),
        };

        let counts = match fetched {
            Ok(counts) => counts,
            Err(e) => {
                stats.devices_failed += 1;
                tracing::warn!(device = %device.id, "Poll failed: {}", e);
                return;
            }
        };
        stats.devices_polled += 1;

        let now = self.clock.now();
        self.board
            .update(&device.id, counts.entered, counts.exited, now);

        for record in self
            .detector
            .observe(&device.id, counts.entered, counts.exited, now)
        {
            match self.sink.write(&record) {
                Ok(()) => stats.records_written += 1,
                Err(e) => tracing::error!(device = %device.id, "Failed to log record: {}", e),
            }
        }
    }

    /// Run until `shutdown` becomes true or its sender is dropped.
    ///
    /// A tick in progress finishes the device it is polling, then stops.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Polling {} devices every {:?}",
            self.registry.len(),
            self.interval
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            let stats = self.poll_devices(Some(&shutdown)).await;
            if stats.devices_failed > 0 || stats.records_written > 0 {
                tracing::debug!(
                    "Tick: {} polled, {} failed, {} records",
                    stats.devices_polled,
                    stats.devices_failed,
                    stats.records_written
                );
            }
        }

        tracing::info!("Poll loop stopped");
    }

    /// Start the loop on the tokio runtime.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        PollerHandle { shutdown, task }
    }
}

/// Control handle for a spawned [`PollLoop`].
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollState {
        if self.task.is_finished() {
            PollState::Stopped
        } else {
            PollState::Running
        }
    }

    /// Ask the loop to stop and wait for it.
    pub async fn stop(self) -> Result<(), JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}
