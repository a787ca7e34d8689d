//! Top-level orchestration state machine.
//!
//! The orchestrator owns the motion monitor, the heart-rate sampler, the
//! power controller and the daily log, and sequences the system through its
//! states: sleep, debounced wake detection, a bounded measurement window,
//! result display and record logging. All collaborators are injected at
//! boot, so the whole machine runs unmodified against real drivers or the
//! deterministic simulation rig.
//!
//! All state mutation happens synchronously inside [`Orchestrator::tick`];
//! interrupt context only enqueues samples. The caller's loop is:
//!
//! ```text
//! loop {
//!     let plan = orchestrator.tick();
//!     // suspend per plan; an armed interrupt cancels the timer early
//! }
//! ```

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{Config, InterruptPriority};
use crate::core::daylog::DailyLog;
use crate::core::heartrate::{HeartRateRecord, HeartRateSampler};
use crate::core::motion::{MotionMonitor, MotionSignal, WakeDetectionState};
use crate::core::power::{PowerController, SleepPlan};
use crate::diagnostics::SharedDiagnostics;
use crate::hal::types::Millis;
use crate::hal::{Clock, Display, MotionSource, PersistentStore, ProbeError, PulseSource, ReadError};

/// System-level orchestration state. Exactly one is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    /// Lowest power; woken by timer only.
    DeepSleep,
    /// Low power with the motion interrupt armed.
    LightSleep,
    /// Above-threshold motion observed; debounce in progress.
    MotionDetected,
    /// Measurement window open; collecting beats.
    MeasuringHeartRate,
    /// Holding a finished measurement on the display.
    DisplayingResult,
    /// Appending and persisting the record.
    LoggingData,
}

impl SystemState {
    pub fn label(&self) -> &'static str {
        match self {
            SystemState::DeepSleep => "deep-sleep",
            SystemState::LightSleep => "light-sleep",
            SystemState::MotionDetected => "motion-detected",
            SystemState::MeasuringHeartRate => "measuring",
            SystemState::DisplayingResult => "displaying",
            SystemState::LoggingData => "logging",
        }
    }
}

/// Events driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A sleep timer ran out.
    TimerExpired,
    /// The motion monitor started debouncing (left `Asleep`).
    MotionObserved,
    /// The motion monitor confirmed a sustained wake.
    WakeConfirmed,
    /// The debounce run broke below threshold before confirmation.
    MotionLapsed,
    /// No above-threshold motion for the configured timeout.
    SleepTimeout,
    /// The measurement window closed (beat target or timeout).
    WindowClosed,
    /// The display dwell time elapsed.
    DisplayDone,
    /// The record (if any) was appended.
    RecordLogged,
}

/// The authoritative transition function. Pure: no side effects, fully
/// testable in isolation. Any (state, event) pair not listed here leaves the
/// state unchanged.
pub fn next_state(state: SystemState, event: Event, in_valid_window: bool) -> SystemState {
    use Event::*;
    use SystemState::*;

    match (state, event) {
        (DeepSleep, TimerExpired) if in_valid_window => LightSleep,
        (DeepSleep, TimerExpired) => DeepSleep, // re-arm
        (LightSleep, MotionObserved) => MotionDetected,
        (LightSleep, SleepTimeout) => DeepSleep,
        (MotionDetected, WakeConfirmed) if in_valid_window => MeasuringHeartRate,
        (MotionDetected, WakeConfirmed) => LightSleep, // reject: wrong time window
        (MotionDetected, MotionLapsed) => LightSleep,
        (MeasuringHeartRate, WindowClosed) => DisplayingResult,
        (DisplayingResult, DisplayDone) => LoggingData,
        (LoggingData, RecordLogged) => LightSleep,
        (s, _) => s,
    }
}

/// Injected hardware collaborators.
pub struct Peripherals {
    pub motion: Box<dyn MotionSource>,
    pub pulse: Box<dyn PulseSource>,
    pub clock: Box<dyn Clock>,
    pub display: Box<dyn Display>,
    pub store: Box<dyn PersistentStore>,
}

/// Fatal boot failures. A heart-rate monitor with a missing pulse or motion
/// sensor has no safe degraded mode, so the caller halts in low-power idle
/// after reporting.
#[derive(Debug)]
pub enum BootError {
    SensorMissing {
        sensor: &'static str,
        cause: ProbeError,
    },
}

impl std::fmt::Display for BootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootError::SensorMissing { sensor, cause } => {
                write!(f, "{sensor} sensor failed to initialize: {cause}")
            }
        }
    }
}

impl std::error::Error for BootError {}

/// The top-level state machine.
pub struct Orchestrator {
    config: Config,
    periph: Peripherals,
    diag: SharedDiagnostics,
    state: SystemState,
    monitor: MotionMonitor,
    sampler: HeartRateSampler,
    power: PowerController,
    log: DailyLog,
    measure_started_ms: Option<Millis>,
    display_until_ms: Option<Millis>,
    pending_record: Option<HeartRateRecord>,
}

impl Orchestrator {
    /// Probe the required sensors and construct the machine in its initial
    /// state: light sleep within valid wake hours, deep sleep otherwise.
    pub fn boot(
        mut periph: Peripherals,
        config: Config,
        diag: SharedDiagnostics,
    ) -> Result<Self, BootError> {
        if let Err(e) = probe_with_retry(
            "motion",
            config.init_retry_attempts,
            config.init_retry_backoff_ms,
            || periph.motion.probe(),
        ) {
            periph.display.show_fault(&e.to_string());
            return Err(e);
        }
        info!("motion sensor initialized");

        if let Err(e) = probe_with_retry(
            "pulse",
            config.init_retry_attempts,
            config.init_retry_backoff_ms,
            || periph.pulse.probe(),
        ) {
            periph.display.show_fault(&e.to_string());
            return Err(e);
        }
        info!("pulse sensor initialized");

        let wall = periph.clock.wall_clock();
        match periph.store.load_today_count(wall.date) {
            Ok(count) => info!(count, "records already persisted today"),
            Err(e) => warn!(error = %e, "could not read today's record count"),
        }

        let state = if config.is_valid_wake_hour(wall.hour) {
            SystemState::LightSleep
        } else {
            SystemState::DeepSleep
        };
        info!(
            hour = wall.hour,
            state = state.label(),
            "boot complete"
        );

        let now = periph.clock.now_ms();
        let monitor = MotionMonitor::new(&config, now);
        let sampler = HeartRateSampler::new(&config);
        let power = PowerController::new(&config);
        let log = DailyLog::new(config.max_daily_records, wall.date);

        let mut orch = Self {
            config,
            periph,
            diag,
            state,
            monitor,
            sampler,
            power,
            log,
            measure_started_ms: None,
            display_until_ms: None,
            pending_record: None,
        };
        orch.periph.display.show_status(state);
        Ok(orch)
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn daily_log(&self) -> &DailyLog {
        &self.log
    }

    /// Run one control-loop iteration: drain pending interrupts, advance the
    /// active state, and return the sleep plan for the caller's suspension
    /// point.
    pub fn tick(&mut self) -> SleepPlan {
        let now = self.periph.clock.now_ms();

        match self.state {
            SystemState::DeepSleep => {
                // Timer expiry is the only way out; motion is disarmed.
                self.apply(Event::TimerExpired);
            }
            SystemState::LightSleep | SystemState::MotionDetected => {
                self.drain_motion(now);
            }
            SystemState::MeasuringHeartRate => {
                self.run_measurement(now);
            }
            SystemState::DisplayingResult => {
                if self.display_until_ms.map_or(true, |t| now >= t) {
                    self.apply(Event::DisplayDone);
                }
            }
            SystemState::LoggingData => {
                self.log_pending_record();
                self.apply(Event::RecordLogged);
            }
        }

        self.power.select_sleep(self.state)
    }

    /// Feed queued motion samples to the monitor and translate its signals
    /// into state-machine events.
    fn drain_motion(&mut self, now: Millis) {
        while self.periph.motion.interrupt_pending() {
            match self.periph.motion.read_magnitude() {
                Ok(sample) => {
                    self.diag.record_motion_sample();
                    match self.monitor.feed(&sample) {
                        Some(MotionSignal::WakeConfirmed) => self.apply(Event::WakeConfirmed),
                        Some(MotionSignal::SleepTimeout) => self.apply(Event::SleepTimeout),
                        None => match (self.state, self.monitor.state()) {
                            (SystemState::LightSleep, WakeDetectionState::MotionDetected) => {
                                self.apply(Event::MotionObserved)
                            }
                            (SystemState::MotionDetected, WakeDetectionState::Asleep) => {
                                self.apply(Event::MotionLapsed)
                            }
                            _ => {}
                        },
                    }
                    // A transition out of wake detection ends this drain.
                    if !matches!(
                        self.state,
                        SystemState::LightSleep | SystemState::MotionDetected
                    ) {
                        return;
                    }
                }
                Err(ReadError::NotReady) => break,
                Err(e) => {
                    self.diag.record_sample_dropped();
                    warn!(error = %e, "dropped motion sample");
                }
            }
        }

        // The timeout must also fire when the sensor is quiet and nothing
        // arrives on the bus at all.
        if self.state == SystemState::LightSleep {
            if self.monitor.check_idle(now).is_some() {
                self.apply(Event::SleepTimeout);
            }
        }
    }

    /// One measurement-window iteration: drain both sources in configured
    /// priority order, then check the close conditions.
    fn run_measurement(&mut self, now: Millis) {
        match self.config.interrupt_priority {
            InterruptPriority::MotionFirst => {
                self.discard_motion();
                self.drain_pulse();
            }
            InterruptPriority::PulseFirst => {
                self.drain_pulse();
                self.discard_motion();
            }
        }

        let started = self.measure_started_ms.unwrap_or(now);
        let beat_target_met = self.sampler.beats() >= self.config.hr_average_samples;
        let timed_out = now.saturating_sub(started) >= self.config.hr_measurement_window_ms;

        // Early success and timeout race; whichever comes first closes the
        // window. Neither is an error.
        if beat_target_met || timed_out {
            self.close_window();
        }
    }

    fn drain_pulse(&mut self) {
        while self.periph.pulse.interrupt_pending() {
            if self.sampler.beats() >= self.config.hr_average_samples {
                break;
            }
            match self.periph.pulse.read_pulse() {
                Ok(sample) => {
                    self.diag.record_pulse_sample();
                    if self.sampler.feed(&sample) {
                        debug!(beats = self.sampler.beats(), "beat detected");
                    }
                }
                Err(ReadError::NotReady) => break,
                Err(e) => {
                    self.diag.record_sample_dropped();
                    warn!(error = %e, "dropped pulse sample");
                }
            }
        }
    }

    /// Motion is ignored while measuring, but the FIFO is still drained so
    /// the pending flag clears and the bus stays serialized.
    fn discard_motion(&mut self) {
        while self.periph.motion.interrupt_pending() {
            match self.periph.motion.read_magnitude() {
                Ok(_) => self.diag.record_motion_sample(),
                Err(ReadError::NotReady) => break,
                Err(e) => {
                    self.diag.record_sample_dropped();
                    warn!(error = %e, "dropped motion sample");
                }
            }
        }
    }

    fn close_window(&mut self) {
        let wall = self.periph.clock.wall_clock();
        let record = self
            .sampler
            .current_average(wall.to_datetime())
            .filter(|r| r.sample_count >= self.config.min_beats_for_record);

        self.diag.record_measurement_completed();
        info!(
            beats = self.sampler.beats(),
            jitter_ms = self.sampler.interval_jitter_ms(),
            produced_record = record.is_some(),
            "measurement window closed"
        );

        self.pending_record = record;
        self.apply(Event::WindowClosed);
    }

    fn log_pending_record(&mut self) {
        let wall = self.periph.clock.wall_clock();

        // Day boundary: archive the finished sequence. Its records were
        // persisted as they were logged, so the handoff is just the reset.
        if let Some(archived) = self.log.rollover(wall.date) {
            info!(
                day = %archived.date,
                records = archived.records.len(),
                "archived previous day"
            );
        }

        // Retry records that failed to persist earlier.
        for record in self.log.take_unsynced() {
            match self.periph.store.append_record(&record) {
                Ok(()) => {
                    self.diag.record_logged();
                    info!("persisted previously unsynced record");
                }
                Err(e) => {
                    self.diag.record_store_failure();
                    warn!(error = %e, "record still unsynced");
                    self.log.queue_unsynced(record);
                }
            }
        }

        match self.pending_record.take() {
            Some(record) => {
                if self.log.append(record.clone()).is_some() {
                    debug!("retention cap reached, evicted oldest record");
                }
                match self.periph.store.append_record(&record) {
                    Ok(()) => self.diag.record_logged(),
                    Err(e) => {
                        self.diag.record_store_failure();
                        warn!(error = %e, "record held for retry");
                        self.log.queue_unsynced(record);
                    }
                }
            }
            None => debug!("measurement produced no record, nothing to log"),
        }
    }

    /// Apply one event through the transition function, then run entry side
    /// effects if the state changed.
    fn apply(&mut self, event: Event) {
        let wall = self.periph.clock.wall_clock();
        let valid = self.config.is_valid_wake_hour(wall.hour);

        match event {
            Event::WakeConfirmed => {
                if valid {
                    self.diag.record_wake_confirmed();
                } else {
                    self.diag.record_wake_rejected();
                    info!(hour = wall.hour, "wake rejected outside valid hours");
                }
            }
            Event::SleepTimeout => self.diag.record_sleep_timeout(),
            _ => {}
        }

        let next = next_state(self.state, event, valid);
        if next == self.state {
            if self.state == SystemState::DeepSleep && event == Event::TimerExpired {
                debug!(hour = wall.hour, "deep sleep re-armed");
            }
            return;
        }

        info!(from = self.state.label(), to = next.label(), "state transition");
        self.enter(next);
    }

    /// Entry side effects for the new state.
    fn enter(&mut self, next: SystemState) {
        let now = self.periph.clock.now_ms();
        self.state = next;
        self.periph.display.show_status(next);

        match next {
            SystemState::DeepSleep | SystemState::LightSleep => {
                // Sub-state reset rule: wake detection re-arms whenever the
                // system returns to a sleep state. Stale FIFO content must
                // not seed the next debounce run.
                self.monitor.reset(now);
                self.flush_motion_fifo();
                self.display_until_ms = None;
            }
            SystemState::MotionDetected => {}
            SystemState::MeasuringHeartRate => {
                self.sampler.reset();
                self.measure_started_ms = Some(now);
                self.flush_pulse_fifo();
            }
            SystemState::DisplayingResult => {
                self.display_until_ms = Some(now + self.config.display_dwell_ms);
                if let Some(ref record) = self.pending_record {
                    self.periph.display.show_result(record);
                }
            }
            SystemState::LoggingData => {}
        }
    }

    fn flush_motion_fifo(&mut self) {
        while self.periph.motion.interrupt_pending() {
            if self.periph.motion.read_magnitude().is_err() {
                break;
            }
        }
    }

    fn flush_pulse_fifo(&mut self) {
        while self.periph.pulse.interrupt_pending() {
            if self.periph.pulse.read_pulse().is_err() {
                break;
            }
        }
    }
}

fn probe_with_retry(
    sensor: &'static str,
    attempts: u32,
    backoff_ms: u64,
    mut probe: impl FnMut() -> Result<(), ProbeError>,
) -> Result<(), BootError> {
    let attempts = attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        match probe() {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(sensor, attempt, error = %e, "sensor probe failed");
                last = Some(e);
                if attempt < attempts && backoff_ms > 0 {
                    thread::sleep(Duration::from_millis(backoff_ms));
                }
            }
        }
    }
    Err(BootError::SensorMissing {
        sensor,
        cause: last.unwrap_or(ProbeError::NotPresent),
    })
}
