//! Pulsewatch - wearable heart-rate controller.
//!
//! This library decides, from raw motion and optical-pulse signals, when to
//! sleep, when to wake and measure a heart rate, and when to discard a wake
//! as a false alarm. All hardware access goes through injected traits, so
//! the same state machines run against real drivers on-device and against
//! the deterministic simulation rig on a workstation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                          │
//! │                                                              │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌────────────────┐  │
//! │  │   Motion    │  │    HeartRate     │  │     Power      │  │
//! │  │   Monitor   │  │     Sampler      │  │   Controller   │  │
//! │  │ (debounce)  │  │ (beat avg)       │  │ (sleep plans)  │  │
//! │  └──────▲──────┘  └────────▲─────────┘  └────────────────┘  │
//! │         │                  │                                 │
//! │  ┌──────┴──────┐  ┌────────┴─────────┐  ┌────────────────┐  │
//! │  │ MotionSource│  │   PulseSource    │  │   DailyLog     │  │
//! │  │  (trait)    │  │    (trait)       │  │ (bounded FIFO) │  │
//! │  └─────────────┘  └──────────────────┘  └───────┬────────┘  │
//! │                                                 │           │
//! │        Clock / Display / PersistentStore (traits)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pulsewatch::config::Config;
//! use pulsewatch::core::{Orchestrator, Peripherals};
//! use pulsewatch::diagnostics::create_shared_diagnostics;
//! use pulsewatch::hal::sim::{sim_motion, sim_pulse, MemoryStore, SimClock, SimDisplay};
//!
//! let config = Config::default();
//! let clock = SimClock::new(
//!     chrono::NaiveDate::from_ymd_opt(2024, 3, 14)
//!         .unwrap()
//!         .and_hms_opt(6, 0, 0)
//!         .unwrap(),
//! );
//! let (_motion_tx, motion) = sim_motion(true);
//! let (_pulse_tx, pulse) = sim_pulse(true);
//!
//! let periph = Peripherals {
//!     motion: Box::new(motion),
//!     pulse: Box::new(pulse),
//!     clock: Box::new(clock.clone()),
//!     display: Box::new(SimDisplay::new()),
//!     store: Box::new(MemoryStore::new()),
//! };
//!
//! let mut orchestrator =
//!     Orchestrator::boot(periph, config, create_shared_diagnostics()).expect("boot");
//! let _plan = orchestrator.tick();
//! ```

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod hal;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, InterruptPriority};
pub use core::{
    next_state, ArmedInterrupts, BootError, Confidence, DailyLog, Event, HeartRateRecord,
    HeartRateSampler, MotionMonitor, MotionSignal, Orchestrator, Peripherals, PowerController,
    SleepMode, SleepPlan, SystemState, WakeDetectionState,
};
pub use diagnostics::{
    create_shared_diagnostics, create_shared_diagnostics_with_persistence, Diagnostics,
    DiagnosticsStats, SharedDiagnostics,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
