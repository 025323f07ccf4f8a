use crate::probe::NoiseProbe;
use crate::store::{MonitorStore, NoiseSample};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Bounded wait for the worker to finish its current tick on `stop()`.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Synthetic readings are drawn from this range when the device is away.
const SIMULATED_RANGE: std::ops::RangeInclusive<f64> = 30.0..=80.0;

/// Source of noise readings. `None` means the sensor is unavailable.
#[async_trait]
pub trait NoiseSource: Send + Sync {
    async fn read(&self) -> Option<f64>;
}

#[async_trait]
impl NoiseSource for NoiseProbe {
    async fn read(&self) -> Option<f64> {
        NoiseProbe::read(self).await
    }
}

/// Alert signal fired when a reading crosses the threshold.
#[async_trait]
pub trait AlertSink: Send {
    async fn trigger(&mut self);
}

#[async_trait]
impl AlertSink for crate::buzzer::Buzzer {
    async fn trigger(&mut self) {
        crate::buzzer::Buzzer::trigger(self).await;
    }
}

/// Poll worker lifecycle. There is no paused state: the worker either
/// exists and runs, or it does not.
enum WorkerState {
    Stopped,
    Running {
        stop_tx: watch::Sender<bool>,
        handle: JoinHandle<()>,
    },
}

/// Background noise monitor.
///
/// Owns the poll loop that samples the device, compares against the
/// persisted threshold, appends to the log, and fires the alert sink.
/// All accessors are safe to call concurrently with an in-flight tick
/// and never wait on device I/O.
pub struct NoiseMonitor {
    store: MonitorStore,
    source: Arc<dyn NoiseSource>,
    sink: Mutex<Box<dyn AlertSink>>,
    poll_interval: Duration,
    current: std::sync::Mutex<f64>,
    worker: Mutex<WorkerState>,
}

impl NoiseMonitor {
    pub fn new(
        store: MonitorStore,
        source: Arc<dyn NoiseSource>,
        sink: Box<dyn AlertSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            sink: Mutex::new(sink),
            poll_interval,
            current: std::sync::Mutex::new(0.0),
            worker: Mutex::new(WorkerState::Stopped),
        }
    }

    /// Start the poll worker. Calling while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if let WorkerState::Running { handle, .. } = &*worker {
            if !handle.is_finished() {
                return;
            }
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!("Noise monitor started (interval {:?})", monitor.poll_interval);
            loop {
                monitor.tick().await;
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = sleep(monitor.poll_interval) => {}
                }
            }
            info!("Noise monitor stopped");
        });

        *worker = WorkerState::Running { stop_tx, handle };
    }

    /// Signal the worker to exit and wait up to [`STOP_GRACE`] for it.
    ///
    /// A worker that overruns the grace period is detached, not killed;
    /// it observes the stop flag at its next sleep and exits on its own.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        match std::mem::replace(&mut *worker, WorkerState::Stopped) {
            WorkerState::Stopped => {}
            WorkerState::Running { stop_tx, handle } => {
                let _ = stop_tx.send(true);
                if timeout(STOP_GRACE, handle).await.is_err() {
                    warn!("Noise monitor worker did not stop within {:?}", STOP_GRACE);
                }
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        match &*self.worker.lock().await {
            WorkerState::Stopped => false,
            WorkerState::Running { handle, .. } => !handle.is_finished(),
        }
    }

    /// One poll cycle: sample, compare, log, maybe alert.
    pub async fn tick(&self) {
        let (value, simulated) = match self.source.read().await {
            Some(value) => (value, false),
            None => (simulated_noise(), true),
        };

        *self.current.lock().unwrap() = value;

        let threshold = self.store.threshold();
        let alerted = value >= threshold;

        let timestamp = Utc::now().to_rfc3339();
        if let Err(e) = self.store.append_log(&timestamp, value, alerted, simulated) {
            // A missed log write must not pause sampling.
            warn!("Failed to record noise sample: {:#}", e);
        }

        if alerted {
            self.sink.lock().await.trigger().await;
        }
    }

    /// Most recent sampled value, rounded to one decimal.
    pub fn current(&self) -> f64 {
        round1(*self.current.lock().unwrap())
    }

    pub fn threshold(&self) -> f64 {
        self.store.threshold()
    }

    /// Persist a new alert threshold, effective from the next tick.
    pub fn set_threshold(&self, value: f64) -> Result<()> {
        if !value.is_finite() {
            bail!("Threshold must be a finite number");
        }
        self.store.set_threshold(value)
    }

    pub fn logs(&self, limit: u32) -> Result<Vec<NoiseSample>> {
        self.store.recent_logs(limit)
    }
}

fn simulated_noise() -> f64 {
    round1(rand::thread_rng().gen_range(SIMULATED_RANGE))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Source that replays a fixed script of readings, then goes away.
    struct ScriptedSource {
        readings: std::sync::Mutex<VecDeque<Option<f64>>>,
    }

    impl ScriptedSource {
        fn new(readings: Vec<Option<f64>>) -> Arc<Self> {
            Arc::new(Self {
                readings: std::sync::Mutex::new(readings.into()),
            })
        }
    }

    #[async_trait]
    impl NoiseSource for ScriptedSource {
        async fn read(&self) -> Option<f64> {
            self.readings.lock().unwrap().pop_front().flatten()
        }
    }

    /// Sink that counts trigger calls instead of touching hardware.
    struct RecordingSink {
        fired: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn trigger(&mut self) {
            self.fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn build_monitor(
        dir: &TempDir,
        readings: Vec<Option<f64>>,
    ) -> (Arc<NoiseMonitor>, Arc<AtomicUsize>) {
        let store = MonitorStore::open(dir.path().join("noise.db")).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let sink = Box::new(RecordingSink {
            fired: Arc::clone(&fired),
        });
        let monitor = Arc::new(NoiseMonitor::new(
            store,
            ScriptedSource::new(readings),
            sink,
            Duration::from_millis(10),
        ));
        (monitor, fired)
    }

    #[tokio::test]
    async fn ticks_log_against_the_threshold_in_effect() {
        let dir = TempDir::new().unwrap();
        let (monitor, fired) =
            build_monitor(&dir, vec![Some(55.0), Some(62.0), Some(30.0)]);

        monitor.tick().await;
        monitor.tick().await;
        monitor.tick().await;

        let logs = monitor.logs(10).unwrap();
        assert_eq!(logs.len(), 3);

        // Most-recent-first retrieval.
        assert_eq!(logs[0].noise, 30.0);
        assert!(!logs[0].alerted);
        assert_eq!(logs[1].noise, 62.0);
        assert!(logs[1].alerted);
        assert_eq!(logs[2].noise, 55.0);
        assert!(!logs[2].alerted);

        assert!(logs.iter().all(|entry| !entry.simulated));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.current(), 30.0);
    }

    #[tokio::test]
    async fn threshold_changes_apply_from_the_next_tick() {
        let dir = TempDir::new().unwrap();
        let (monitor, _) = build_monitor(&dir, vec![Some(55.0), Some(55.0)]);

        monitor.tick().await;
        monitor.set_threshold(50.0).unwrap();
        monitor.tick().await;

        let logs = monitor.logs(10).unwrap();
        assert!(!logs[1].alerted, "55.0 below the default 60.0");
        assert!(logs[0].alerted, "55.0 above the lowered 50.0");
    }

    #[tokio::test]
    async fn equal_reading_and_threshold_alerts() {
        let dir = TempDir::new().unwrap();
        let (monitor, fired) = build_monitor(&dir, vec![Some(60.0)]);

        monitor.tick().await;

        assert!(monitor.logs(1).unwrap()[0].alerted);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_source_substitutes_a_marked_synthetic_value() {
        let dir = TempDir::new().unwrap();
        let (monitor, _) = build_monitor(&dir, vec![None]);

        monitor.tick().await;

        let logs = monitor.logs(1).unwrap();
        assert_eq!(logs.len(), 1, "a tick always logs exactly one entry");
        assert!(logs[0].simulated);
        assert!((30.0..=80.0).contains(&logs[0].noise));
        // One decimal of precision, like a real device reading.
        assert_eq!(logs[0].noise, (logs[0].noise * 10.0).round() / 10.0);
    }

    #[tokio::test]
    async fn rejects_non_finite_threshold() {
        let dir = TempDir::new().unwrap();
        let (monitor, _) = build_monitor(&dir, vec![]);

        assert!(monitor.set_threshold(f64::NAN).is_err());
        assert!(monitor.set_threshold(f64::INFINITY).is_err());
        assert_eq!(monitor.threshold(), crate::store::DEFAULT_THRESHOLD);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_rearms() {
        let dir = TempDir::new().unwrap();
        let (monitor, _) = build_monitor(&dir, vec![Some(40.0); 64]);

        monitor.start().await;
        monitor.start().await;
        assert!(monitor.is_running().await);

        sleep(Duration::from_millis(50)).await;
        monitor.stop().await;
        assert!(!monitor.is_running().await);

        let after_stop = monitor.logs(100).unwrap().len();
        assert!(after_stop >= 1, "worker ticked while running");

        sleep(Duration::from_millis(50)).await;
        assert_eq!(
            monitor.logs(100).unwrap().len(),
            after_stop,
            "no ticks after stop"
        );

        monitor.start().await;
        assert!(monitor.is_running().await);
        sleep(Duration::from_millis(50)).await;
        monitor.stop().await;
        assert!(monitor.logs(100).unwrap().len() > after_stop, "polling resumed");
    }

    #[tokio::test]
    async fn accessors_work_while_the_worker_runs() {
        let dir = TempDir::new().unwrap();
        let (monitor, _) = build_monitor(&dir, vec![Some(45.5); 64]);

        monitor.start().await;
        sleep(Duration::from_millis(30)).await;

        assert_eq!(monitor.current(), 45.5);
        monitor.set_threshold(44.0).unwrap();
        assert_eq!(monitor.threshold(), 44.0);
        assert!(!monitor.logs(5).unwrap().is_empty());

        monitor.stop().await;
    }
}
