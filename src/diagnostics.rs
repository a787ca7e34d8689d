//! Diagnostics counters.
//!
//! Transient faults are recovered silently by design; this module is where
//! they stay visible. The orchestrator bumps these counters as it runs and
//! the CLI can show cumulative statistics across sessions.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event and fault counters for the current session.
#[derive(Debug)]
pub struct Diagnostics {
    motion_samples: AtomicU64,
    pulse_samples: AtomicU64,
    samples_dropped: AtomicU64,
    wakes_confirmed: AtomicU64,
    wakes_rejected: AtomicU64,
    sleep_timeouts: AtomicU64,
    measurements_completed: AtomicU64,
    records_logged: AtomicU64,
    store_failures: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            motion_samples: AtomicU64::new(0),
            pulse_samples: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            wakes_confirmed: AtomicU64::new(0),
            wakes_rejected: AtomicU64::new(0),
            sleep_timeouts: AtomicU64::new(0),
            measurements_completed: AtomicU64::new(0),
            records_logged: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create diagnostics that accumulate into a stats file across sessions.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut diag = Self::new();
        diag.persist_path = Some(path);

        if let Err(e) = diag.load() {
            eprintln!("Note: Could not load previous diagnostics: {e}");
        }

        diag
    }

    pub fn record_motion_sample(&self) {
        self.motion_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pulse_sample(&self) {
        self.pulse_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// A malformed sample was discarded without disturbing any state machine.
    pub fn record_sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_confirmed(&self) {
        self.wakes_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    /// A confirmed wake arrived outside the valid wake window.
    pub fn record_wake_rejected(&self) {
        self.wakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sleep_timeout(&self) {
        self.sleep_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_measurement_completed(&self) {
        self.measurements_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_logged(&self) {
        self.records_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> DiagnosticsStats {
        DiagnosticsStats {
            motion_samples: self.motion_samples.load(Ordering::Relaxed),
            pulse_samples: self.pulse_samples.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            wakes_confirmed: self.wakes_confirmed.load(Ordering::Relaxed),
            wakes_rejected: self.wakes_rejected.load(Ordering::Relaxed),
            sleep_timeouts: self.sleep_timeouts.load(Ordering::Relaxed),
            measurements_completed: self.measurements_completed.load(Ordering::Relaxed),
            records_logged: self.records_logged.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Motion samples processed: {}\n\
             - Pulse samples processed: {}\n\
             - Samples dropped (transient errors): {}\n\
             - Wakes confirmed: {}\n\
             - Wakes rejected (outside valid hours): {}\n\
             - Sleep timeouts: {}\n\
             - Measurements completed: {}\n\
             - Records logged: {}\n\
             - Store failures: {}\n\
             - Session duration: {} seconds",
            stats.motion_samples,
            stats.pulse_samples,
            stats.samples_dropped,
            stats.wakes_confirmed,
            stats.wakes_rejected,
            stats.sleep_timeouts,
            stats.measurements_completed,
            stats.records_logged,
            stats.store_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                motion_samples: stats.motion_samples,
                pulse_samples: stats.pulse_samples,
                samples_dropped: stats.samples_dropped,
                wakes_confirmed: stats.wakes_confirmed,
                wakes_rejected: stats.wakes_rejected,
                sleep_timeouts: stats.sleep_timeouts,
                measurements_completed: stats.measurements_completed,
                records_logged: stats.records_logged,
                store_failures: stats.store_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.motion_samples
                    .store(persisted.motion_samples, Ordering::Relaxed);
                self.pulse_samples
                    .store(persisted.pulse_samples, Ordering::Relaxed);
                self.samples_dropped
                    .store(persisted.samples_dropped, Ordering::Relaxed);
                self.wakes_confirmed
                    .store(persisted.wakes_confirmed, Ordering::Relaxed);
                self.wakes_rejected
                    .store(persisted.wakes_rejected, Ordering::Relaxed);
                self.sleep_timeouts
                    .store(persisted.sleep_timeouts, Ordering::Relaxed);
                self.measurements_completed
                    .store(persisted.measurements_completed, Ordering::Relaxed);
                self.records_logged
                    .store(persisted.records_logged, Ordering::Relaxed);
                self.store_failures
                    .store(persisted.store_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.motion_samples.store(0, Ordering::Relaxed);
        self.pulse_samples.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
        self.wakes_confirmed.store(0, Ordering::Relaxed);
        self.wakes_rejected.store(0, Ordering::Relaxed);
        self.sleep_timeouts.store(0, Ordering::Relaxed);
        self.measurements_completed.store(0, Ordering::Relaxed);
        self.records_logged.store(0, Ordering::Relaxed);
        self.store_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of diagnostics statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsStats {
    pub motion_samples: u64,
    pub pulse_samples: u64,
    pub samples_dropped: u64,
    pub wakes_confirmed: u64,
    pub wakes_rejected: u64,
    pub sleep_timeouts: u64,
    pub measurements_completed: u64,
    pub records_logged: u64,
    pub store_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    motion_samples: u64,
    pulse_samples: u64,
    samples_dropped: u64,
    wakes_confirmed: u64,
    wakes_rejected: u64,
    sleep_timeouts: u64,
    measurements_completed: u64,
    records_logged: u64,
    store_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared diagnostics handle.
pub type SharedDiagnostics = Arc<Diagnostics>;

/// Create new shared diagnostics.
pub fn create_shared_diagnostics() -> SharedDiagnostics {
    Arc::new(Diagnostics::new())
}

/// Create shared diagnostics with persistence.
pub fn create_shared_diagnostics_with_persistence(path: PathBuf) -> SharedDiagnostics {
    Arc::new(Diagnostics::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_counting() {
        let diag = Diagnostics::new();

        diag.record_motion_sample();
        diag.record_motion_sample();
        diag.record_pulse_sample();
        diag.record_wake_rejected();

        let stats = diag.stats();
        assert_eq!(stats.motion_samples, 2);
        assert_eq!(stats.pulse_samples, 1);
        assert_eq!(stats.wakes_rejected, 1);
    }

    #[test]
    fn test_diagnostics_reset() {
        let diag = Diagnostics::new();

        diag.record_sample_dropped();
        diag.record_store_failure();
        diag.reset();

        let stats = diag.stats();
        assert_eq!(stats.samples_dropped, 0);
        assert_eq!(stats.store_failures, 0);
    }

    #[test]
    fn test_summary_format() {
        let diag = Diagnostics::new();
        let summary = diag.summary();

        assert!(summary.contains("Motion samples"));
        assert!(summary.contains("Wakes confirmed"));
        assert!(summary.contains("Store failures"));
    }
}
