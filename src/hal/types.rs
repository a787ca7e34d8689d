//! Raw sample types produced by the sensor drivers.
//!
//! Samples are ephemeral: they are consumed by the core state machines as
//! soon as they are drained and are never retained beyond the debounce or
//! measurement window they feed.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic milliseconds since boot.
///
/// A `u64` of milliseconds outlives any plausible device uptime, so wraparound
/// is not handled.
pub type Millis = u64;

/// A single acceleration-magnitude reading from the inertial sensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotionSample {
    /// Acceleration magnitude in g.
    pub magnitude_g: f32,
    /// Monotonic timestamp of the reading.
    pub timestamp_ms: Millis,
}

impl MotionSample {
    pub fn new(magnitude_g: f32, timestamp_ms: Millis) -> Self {
        Self {
            magnitude_g,
            timestamp_ms,
        }
    }
}

/// A single optical reading from the pulse sensor.
///
/// Beat detection runs on the infrared channel; the red channel is carried
/// for drivers that report both but is not used by the core algorithm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PulseSample {
    /// Infrared channel value (raw counts).
    pub ir: u32,
    /// Red channel value (raw counts).
    pub red: u32,
    /// Monotonic timestamp of the reading.
    pub timestamp_ms: Millis,
}

impl PulseSample {
    pub fn new(ir: u32, red: u32, timestamp_ms: Millis) -> Self {
        Self {
            ir,
            red,
            timestamp_ms,
        }
    }
}

/// Wall-clock time as reported by the clock chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallClockTime {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Minute of hour, 0-59.
    pub minute: u8,
    /// Calendar date.
    pub date: NaiveDate,
}

impl WallClockTime {
    pub fn new(hour: u8, minute: u8, date: NaiveDate) -> Self {
        Self { hour, minute, date }
    }

    /// The wall-clock instant as a UTC datetime, minute precision.
    ///
    /// The clock chip reports hour/minute/date only, so seconds are zero.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN);
        NaiveDateTime::new(self.date, time).and_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_sample_creation() {
        let sample = MotionSample::new(2.5, 1000);
        assert!((sample.magnitude_g - 2.5).abs() < f32::EPSILON);
        assert_eq!(sample.timestamp_ms, 1000);
    }

    #[test]
    fn test_wall_clock_to_datetime() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let wall = WallClockTime::new(6, 30, date);
        let dt = wall.to_datetime();
        assert_eq!(dt.to_rfc3339(), "2024-03-14T06:30:00+00:00");
    }

    #[test]
    fn test_wall_clock_invalid_hour_falls_back_to_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        let wall = WallClockTime::new(25, 0, date);
        assert_eq!(wall.to_datetime().to_rfc3339(), "2024-03-14T00:00:00+00:00");
    }
}
