//! Motion-based wake detection.
//!
//! [`MotionMonitor`] consumes acceleration-magnitude samples and runs a
//! threshold-and-duration debounce: a wake is only confirmed after the
//! magnitude stays above the threshold for the full confirmation duration,
//! so a single spike (a bumped nightstand) never wakes the system. It also
//! runs the opposite watch: a long stretch with no above-threshold sample
//! produces a sleep-timeout signal that sends the system into deep sleep.
//!
//! Both timers compare sample timestamps, never sample counts, so changing
//! the inertial sensor's output rate does not change debounce semantics.

use tracing::debug;

use crate::config::Config;
use crate::hal::types::{Millis, MotionSample};

/// Debounce sub-state. Reset to `Asleep` whenever the system returns to a
/// sleep state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeDetectionState {
    /// No qualifying motion in progress.
    Asleep,
    /// Above-threshold motion observed; confirmation timer running.
    MotionDetected,
    /// The confirmation timer completed; wake signal already emitted.
    ConfirmedAwake,
}

/// Signals emitted toward the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionSignal {
    /// Sustained above-threshold motion; emitted exactly once per confirmed
    /// wake.
    WakeConfirmed,
    /// No above-threshold motion for the configured timeout; emitted once
    /// per idle stretch.
    SleepTimeout,
}

/// Threshold-and-duration debounce over acceleration magnitudes.
pub struct MotionMonitor {
    threshold_g: f32,
    confirm_after_ms: u64,
    idle_timeout_ms: u64,
    state: WakeDetectionState,
    /// Timestamp of the first sample of the current above-threshold run.
    run_started_ms: Option<Millis>,
    /// Timestamp of the most recent above-threshold sample, or of the last
    /// reset when none has been seen yet.
    last_above_ms: Millis,
    idle_signaled: bool,
}

impl MotionMonitor {
    pub fn new(config: &Config, now_ms: Millis) -> Self {
        Self {
            threshold_g: config.motion_threshold_g,
            confirm_after_ms: config.motion_duration_ms,
            idle_timeout_ms: config.sleep_motion_timeout_ms,
            state: WakeDetectionState::Asleep,
            run_started_ms: None,
            last_above_ms: now_ms,
            idle_signaled: false,
        }
    }

    pub fn state(&self) -> WakeDetectionState {
        self.state
    }

    /// Consume one sample, possibly emitting a signal.
    pub fn feed(&mut self, sample: &MotionSample) -> Option<MotionSignal> {
        let now = sample.timestamp_ms;

        if sample.magnitude_g >= self.threshold_g {
            self.last_above_ms = now;
            self.idle_signaled = false;

            match self.state {
                WakeDetectionState::Asleep => {
                    debug!(magnitude = sample.magnitude_g, "motion run started");
                    self.state = WakeDetectionState::MotionDetected;
                    self.run_started_ms = Some(now);
                    None
                }
                WakeDetectionState::MotionDetected => {
                    let started = self.run_started_ms.unwrap_or(now);
                    if now.saturating_sub(started) >= self.confirm_after_ms {
                        self.state = WakeDetectionState::ConfirmedAwake;
                        Some(MotionSignal::WakeConfirmed)
                    } else {
                        None
                    }
                }
                // Wake already signaled; further motion is uninteresting
                // until the orchestrator resets us.
                WakeDetectionState::ConfirmedAwake => None,
            }
        } else {
            if self.state == WakeDetectionState::MotionDetected {
                debug!("motion run broken below threshold");
                self.state = WakeDetectionState::Asleep;
                self.run_started_ms = None;
            }
            self.check_idle(now)
        }
    }

    /// Advance the no-motion timeout without a sample. Lets the timeout fire
    /// while the sensor is quiet and nothing is arriving on the bus.
    pub fn check_idle(&mut self, now_ms: Millis) -> Option<MotionSignal> {
        if self.state == WakeDetectionState::Asleep
            && !self.idle_signaled
            && now_ms.saturating_sub(self.last_above_ms) >= self.idle_timeout_ms
        {
            self.idle_signaled = true;
            return Some(MotionSignal::SleepTimeout);
        }
        None
    }

    /// Re-arm the debounce. Called whenever the system returns to a sleep
    /// state.
    pub fn reset(&mut self, now_ms: Millis) {
        self.state = WakeDetectionState::Asleep;
        self.run_started_ms = None;
        self.last_above_ms = now_ms;
        self.idle_signaled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MotionMonitor {
        MotionMonitor::new(&Config::default(), 0)
    }

    fn above(ts: Millis) -> MotionSample {
        MotionSample::new(2.5, ts)
    }

    fn below(ts: Millis) -> MotionSample {
        MotionSample::new(0.3, ts)
    }

    #[test]
    fn test_sustained_motion_confirms_wake() {
        let mut m = monitor();
        let mut signals = Vec::new();
        // 100 Hz for 3001 ms, all above threshold
        for ts in (0..=3000).step_by(10) {
            if let Some(s) = m.feed(&above(ts)) {
                signals.push((ts, s));
            }
        }
        assert_eq!(signals, vec![(3000, MotionSignal::WakeConfirmed)]);
        assert_eq!(m.state(), WakeDetectionState::ConfirmedAwake);
    }

    #[test]
    fn test_wake_emitted_exactly_once() {
        let mut m = monitor();
        let mut count = 0;
        for ts in (0..=6000).step_by(10) {
            if m.feed(&above(ts)) == Some(MotionSignal::WakeConfirmed) {
                count += 1;
            }
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_single_low_sample_resets_debounce() {
        let mut m = monitor();
        // Qualifying window except for one dip in the middle.
        for ts in (0..=3000).step_by(10) {
            let sample = if ts == 1500 { below(ts) } else { above(ts) };
            assert_ne!(m.feed(&sample), Some(MotionSignal::WakeConfirmed));
        }
        // The run restarted at 1510, so confirmation needs 1510 + 3000.
        assert_eq!(m.state(), WakeDetectionState::MotionDetected);
        assert_eq!(m.feed(&above(4510)), Some(MotionSignal::WakeConfirmed));
    }

    #[test]
    fn test_spike_alone_never_wakes() {
        let mut m = monitor();
        assert_eq!(m.feed(&above(0)), None);
        assert_eq!(m.feed(&below(10)), None);
        assert_eq!(m.state(), WakeDetectionState::Asleep);
    }

    #[test]
    fn test_sleep_timeout_after_quiet_stretch() {
        let mut m = monitor();
        let mut signals = Vec::new();
        for ts in (0..=300_000).step_by(1000) {
            if let Some(s) = m.feed(&below(ts)) {
                signals.push((ts, s));
            }
        }
        assert_eq!(signals, vec![(300_000, MotionSignal::SleepTimeout)]);
        // Emitted once per idle stretch.
        assert_eq!(m.feed(&below(301_000)), None);
    }

    #[test]
    fn test_sleep_timeout_fires_without_samples() {
        let mut m = monitor();
        assert_eq!(m.check_idle(299_999), None);
        assert_eq!(m.check_idle(300_000), Some(MotionSignal::SleepTimeout));
        assert_eq!(m.check_idle(400_000), None);
    }

    #[test]
    fn test_above_threshold_defers_sleep_timeout() {
        let mut m = monitor();
        m.feed(&above(100_000));
        m.feed(&below(100_010));
        // Timeout counts from the last above-threshold sample.
        assert_eq!(m.check_idle(300_000), None);
        assert_eq!(
            m.check_idle(400_000),
            Some(MotionSignal::SleepTimeout)
        );
    }

    #[test]
    fn test_reset_rearms_both_timers() {
        let mut m = monitor();
        for ts in (0..=3000).step_by(10) {
            m.feed(&above(ts));
        }
        assert_eq!(m.state(), WakeDetectionState::ConfirmedAwake);

        m.reset(10_000);
        assert_eq!(m.state(), WakeDetectionState::Asleep);
        assert_eq!(m.check_idle(10_000 + 299_999), None);
        assert_eq!(
            m.check_idle(10_000 + 300_000),
            Some(MotionSignal::SleepTimeout)
        );
    }
}
