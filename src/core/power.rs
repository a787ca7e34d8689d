//! Power-mode selection.
//!
//! [`PowerController`] maps the current orchestration state to a sleep plan:
//! which sleep mode to enter, for how long, and which interrupt sources stay
//! armed through it. Deep sleep disarms the motion interrupt entirely, so
//! motion outside the valid wake window never wakes the CPU.

use std::time::Duration;

use crate::config::Config;
use crate::core::orchestrator::SystemState;

/// Hardware sleep depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepMode {
    /// Lowest power; timer wake only.
    Deep,
    /// Peripherals retained; armed interrupts can preempt the timer.
    Light,
}

/// Which interrupt sources remain armed across a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedInterrupts {
    pub motion: bool,
    pub pulse: bool,
}

impl ArmedInterrupts {
    pub const NONE: Self = Self {
        motion: false,
        pulse: false,
    };

    pub const ALL: Self = Self {
        motion: true,
        pulse: true,
    };

    pub const MOTION_ONLY: Self = Self {
        motion: true,
        pulse: false,
    };
}

/// One suspension decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    /// `None` means the CPU stays active (no suspension this iteration).
    pub mode: Option<SleepMode>,
    /// How long to suspend; zero when staying active.
    pub duration: Duration,
    /// Interrupt sources left armed.
    pub armed: ArmedInterrupts,
}

/// Stateless mapping from orchestration state to sleep plan.
pub struct PowerController {
    deep_duration: Duration,
    light_duration: Duration,
}

impl PowerController {
    pub fn new(config: &Config) -> Self {
        Self {
            deep_duration: config.deep_sleep_duration(),
            light_duration: config.light_sleep_duration(),
        }
    }

    /// Select the sleep plan for the given state.
    pub fn select_sleep(&self, state: SystemState) -> SleepPlan {
        match state {
            SystemState::DeepSleep => SleepPlan {
                mode: Some(SleepMode::Deep),
                duration: self.deep_duration,
                // Timer wake only; motion stays disarmed.
                armed: ArmedInterrupts::NONE,
            },
            SystemState::LightSleep => SleepPlan {
                mode: Some(SleepMode::Light),
                duration: self.light_duration,
                armed: ArmedInterrupts::MOTION_ONLY,
            },
            SystemState::MotionDetected
            | SystemState::MeasuringHeartRate
            | SystemState::DisplayingResult
            | SystemState::LoggingData => SleepPlan {
                mode: None,
                duration: Duration::ZERO,
                armed: ArmedInterrupts::ALL,
            },
        }
    }
}
