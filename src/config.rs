//! Configuration for the pulsewatch controller.
//!
//! Every threshold and duration the state machines use lives here, so test
//! rigs and odd deployments can tune behavior without touching the core.
//! Defaults match the reference hardware profile.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Which pending interrupt is drained first when both sources have fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptPriority {
    MotionFirst,
    PulseFirst,
}

/// Main configuration for the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// G-force threshold for wake detection.
    pub motion_threshold_g: f32,

    /// Sustained motion duration required to confirm a wake-up.
    pub motion_duration_ms: u64,

    /// Continuous sub-threshold time before the sleep timeout fires.
    pub sleep_motion_timeout_ms: u64,

    /// Measurement window after wake-up.
    pub hr_measurement_window_ms: u64,

    /// Optical sample rate in Hz.
    pub hr_sample_rate_hz: u32,

    /// Number of beats to average; also closes the window early.
    pub hr_average_samples: u32,

    /// First wall-clock hour (inclusive) in which a wake may proceed.
    pub valid_wake_hour_start: u8,

    /// Last wall-clock hour (exclusive) in which a wake may proceed.
    pub valid_wake_hour_end: u8,

    /// Deep sleep interval in microseconds.
    pub deep_sleep_duration_us: u64,

    /// Light sleep interval in microseconds.
    pub light_sleep_duration_us: u64,

    /// Retention cap for one day's records.
    pub max_daily_records: usize,

    /// How long a finished measurement stays on the display.
    pub display_dwell_ms: u64,

    /// Minimum detected beats for a measurement to produce a record.
    /// Windows that time out below this are discarded.
    pub min_beats_for_record: u32,

    /// Sensor probe attempts before boot is declared fatal.
    pub init_retry_attempts: u32,

    /// Backoff between probe attempts.
    pub init_retry_backoff_ms: u64,

    /// Drain order when both interrupt sources are pending.
    pub interrupt_priority: InterruptPriority,

    /// IANA timezone name used for wake-hour gating.
    pub timezone: String,

    /// Path for record and diagnostics storage.
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulsewatch");

        Self {
            motion_threshold_g: 2.0,
            motion_duration_ms: 3_000,
            sleep_motion_timeout_ms: 300_000, // 5 minutes of no motion = sleep
            hr_measurement_window_ms: 180_000,
            hr_sample_rate_hz: 100,
            hr_average_samples: 30,
            valid_wake_hour_start: 5,
            valid_wake_hour_end: 10,
            deep_sleep_duration_us: 300_000_000,
            light_sleep_duration_us: 60_000_000,
            max_daily_records: 10,
            display_dwell_ms: 5_000,
            min_beats_for_record: 1,
            init_retry_attempts: 3,
            init_retry_backoff_ms: 500,
            interrupt_priority: InterruptPriority::MotionFirst,
            timezone: "UTC".to_string(),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulsewatch")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Resolve the configured timezone, falling back to UTC on a bad name.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Whether a confirmed wake at the given wall-clock hour may proceed to a
    /// measurement.
    pub fn is_valid_wake_hour(&self, hour: u8) -> bool {
        hour >= self.valid_wake_hour_start && hour < self.valid_wake_hour_end
    }

    /// Deep sleep interval as a [`Duration`].
    pub fn deep_sleep_duration(&self) -> Duration {
        Duration::from_micros(self.deep_sleep_duration_us)
    }

    /// Light sleep interval as a [`Duration`].
    pub fn light_sleep_duration(&self) -> Duration {
        Duration::from_micros(self.light_sleep_duration_us)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
