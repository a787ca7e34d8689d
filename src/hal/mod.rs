//! Hardware abstraction layer for the pulsewatch controller.
//!
//! The core state machines never touch a sensor bus directly. Every external
//! collaborator (inertial sensor, optical pulse sensor, clock chip, display,
//! persistent store) is reached through one of the traits in this module, and
//! concrete implementations are injected at construction. The `sim` module
//! provides deterministic implementations used both by the host binary and by
//! the test suite; real register-level drivers live outside this crate.

pub mod sim;
pub mod store;
pub mod types;

use std::time::Instant;

use chrono::{NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::core::heartrate::HeartRateRecord;
use crate::core::orchestrator::SystemState;

// Re-export commonly used types
pub use types::{Millis, MotionSample, PulseSample, WallClockTime};

/// Errors reported by a driver init handshake.
#[derive(Debug)]
pub enum ProbeError {
    /// The device did not answer on the bus at all.
    NotPresent,
    /// The device answered but the handshake failed.
    Bus(String),
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::NotPresent => write!(f, "device not present on bus"),
            ProbeError::Bus(e) => write!(f, "bus error during probe: {e}"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Errors reported by a single sample read.
#[derive(Debug)]
pub enum ReadError {
    /// The sample was malformed or the transaction glitched; the caller drops
    /// the sample and carries on.
    Transient(String),
    /// No sample is currently available.
    NotReady,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Transient(e) => write!(f, "transient read error: {e}"),
            ReadError::NotReady => write!(f, "no sample available"),
        }
    }
}

impl std::error::Error for ReadError {}

/// Errors reported by the persistent store.
#[derive(Debug)]
pub enum StoreError {
    /// The storage medium is absent. Non-fatal: records are held in memory
    /// and retried on the next append opportunity.
    Unavailable,
    /// The medium is present but the operation failed.
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable => write!(f, "storage medium unavailable"),
            StoreError::Io(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The inertial sensor, reduced to acceleration magnitudes.
pub trait MotionSource {
    /// Driver init handshake. Failure at boot is the fatal-init condition.
    fn probe(&mut self) -> Result<(), ProbeError>;

    /// Whether the motion-ready interrupt line has fired since the last read.
    /// Must be safe to call from the control loop at any time; it only
    /// inspects the pending flag and never touches the bus.
    fn interrupt_pending(&self) -> bool;

    /// Read the next acceleration-magnitude sample off the sensor FIFO.
    fn read_magnitude(&mut self) -> Result<MotionSample, ReadError>;
}

/// The optical pulse sensor.
pub trait PulseSource {
    /// Driver init handshake. Failure at boot is the fatal-init condition.
    fn probe(&mut self) -> Result<(), ProbeError>;

    /// Whether the pulse-data-ready interrupt line has fired since the last
    /// read.
    fn interrupt_pending(&self) -> bool;

    /// Read the next optical sample off the sensor FIFO.
    fn read_pulse(&mut self) -> Result<PulseSample, ReadError>;
}

/// Monotonic time plus wall-clock time-of-day.
pub trait Clock {
    /// Monotonic milliseconds since boot. Never decreases.
    fn now_ms(&self) -> Millis;

    /// Wall-clock hour/minute/date from the clock chip.
    fn wall_clock(&self) -> WallClockTime;
}

/// The status display.
///
/// Rendering is external; the controller only announces what to show.
pub trait Display {
    /// Show the current orchestration state.
    fn show_status(&mut self, state: SystemState);

    /// Show a completed heart-rate measurement.
    fn show_result(&mut self, record: &HeartRateRecord);

    /// Show a persistent fault message (fatal init failure).
    fn show_fault(&mut self, message: &str);
}

/// The record persistence collaborator.
pub trait PersistentStore {
    /// Append one record. `StoreError::Unavailable` is non-fatal; the caller
    /// queues the record for retry.
    fn append_record(&mut self, record: &HeartRateRecord) -> Result<(), StoreError>;

    /// How many records are already persisted for the given day.
    fn load_today_count(&mut self, date: NaiveDate) -> Result<u32, StoreError>;
}

/// Real clock: monotonic time from [`Instant`], wall clock from the host
/// clock rendered in the configured timezone.
pub struct SystemClock {
    boot: Instant,
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self {
            boot: Instant::now(),
            tz,
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.boot.elapsed().as_millis() as Millis
    }

    fn wall_clock(&self) -> WallClockTime {
        let now = Utc::now().with_timezone(&self.tz);
        WallClockTime::new(now.hour() as u8, now.minute() as u8, now.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new(chrono_tz::UTC);
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::Unavailable.to_string(),
            "storage medium unavailable"
        );
    }
}
