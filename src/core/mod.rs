//! Core state machines for the pulsewatch controller.
//!
//! This module contains:
//! - Motion-based wake detection (threshold-and-duration debounce)
//! - Heart-rate beat detection and interval averaging
//! - Power-mode selection per orchestration state
//! - Bounded per-day record retention
//! - The top-level orchestration state machine

pub mod daylog;
pub mod heartrate;
pub mod motion;
pub mod orchestrator;
pub mod power;

// Re-export commonly used types
pub use daylog::{ArchivedDay, DailyLog};
pub use heartrate::{Confidence, HeartRateRecord, HeartRateSampler};
pub use motion::{MotionMonitor, MotionSignal, WakeDetectionState};
pub use orchestrator::{next_state, BootError, Event, Orchestrator, Peripherals, SystemState};
pub use power::{ArmedInterrupts, PowerController, SleepMode, SleepPlan};
