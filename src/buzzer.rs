use crate::device::DeviceClient;
use log::warn;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Minimum spacing between two effective buzzer pulses.
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);

/// How long the buzzer stays on per pulse.
const PULSE_HOLD: Duration = Duration::from_secs(1);

/// Time-debounced buzzer pulse on the remote device.
///
/// A pulse switches the buzzer on, holds, and switches it off again.
/// Triggers arriving inside the debounce window collapse into the pulse
/// already sent, so a sustained alert does not hammer the hardware once
/// per poll tick. Signaling is best-effort: device faults are logged and
/// swallowed, never surfaced to the poll loop.
pub struct Buzzer {
    device: DeviceClient,
    enabled: bool,
    debounce: Duration,
    hold: Duration,
    last_pulse: Option<Instant>,
}

impl Buzzer {
    pub fn new(device: DeviceClient, enabled: bool) -> Self {
        Self {
            device,
            enabled,
            debounce: DEBOUNCE_WINDOW,
            hold: PULSE_HOLD,
            last_pulse: None,
        }
    }

    /// Shorter windows for tests; production uses the defaults.
    #[cfg(test)]
    fn with_timing(mut self, debounce: Duration, hold: Duration) -> Self {
        self.debounce = debounce;
        self.hold = hold;
        self
    }

    /// Fire a pulse unless disabled or still inside the debounce window.
    pub async fn trigger(&mut self) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        if !self.ready(now) {
            return;
        }

        match self.pulse().await {
            Ok(()) => self.last_pulse = Some(now),
            Err(e) => warn!("Buzzer signal failed: {}", e),
        }
    }

    fn ready(&self, now: Instant) -> bool {
        match self.last_pulse {
            None => true,
            Some(last) => now.duration_since(last) >= self.debounce,
        }
    }

    async fn pulse(&self) -> Result<(), reqwest::Error> {
        self.device.set_buzzer(true).await?;
        sleep(self.hold).await;
        self.device.set_buzzer(false).await
    }
}
