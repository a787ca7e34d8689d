//! Deterministic simulated peripherals.
//!
//! These exist so the controller runs and is testable off-device: the test
//! suite drives the orchestrator with scripted samples and a hand-advanced
//! clock, and the `run` subcommand drives it with a synthetic wearer. Each
//! simulated sensor is fed through a bounded single-producer single-consumer
//! channel; channel emptiness doubles as the interrupt pending flag, which
//! matches the flag-set/loop-drain discipline of the real drivers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime, Timelike};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::core::heartrate::HeartRateRecord;
use crate::core::orchestrator::SystemState;
use crate::core::power::SleepPlan;
use crate::hal::types::{Millis, MotionSample, PulseSample, WallClockTime};
use crate::hal::{Clock, Display, MotionSource, PersistentStore, ProbeError, PulseSource,
    ReadError, StoreError};

/// Queue depth for each simulated sensor FIFO.
const SIM_FIFO_DEPTH: usize = 65_536;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// A hand-advanced clock. Cloned handles share the same time, so the rig can
/// advance while the orchestrator reads.
#[derive(Clone)]
pub struct SimClock {
    inner: Arc<SimClockInner>,
}

struct SimClockInner {
    now_ms: AtomicU64,
    base: NaiveDateTime,
}

impl SimClock {
    /// Create a clock whose wall time at boot is `base`.
    pub fn new(base: NaiveDateTime) -> Self {
        Self {
            inner: Arc::new(SimClockInner {
                now_ms: AtomicU64::new(0),
                base,
            }),
        }
    }

    /// Advance monotonic time by `ms`.
    pub fn advance(&self, ms: Millis) {
        self.inner.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Advance monotonic time to `ms` since boot. Never moves backwards.
    pub fn advance_to(&self, ms: Millis) {
        self.inner.now_ms.fetch_max(ms, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> Millis {
        self.inner.now_ms.load(Ordering::SeqCst)
    }

    fn wall_clock(&self) -> WallClockTime {
        let now = self.inner.base + Duration::milliseconds(self.now_ms() as i64);
        WallClockTime::new(now.hour() as u8, now.minute() as u8, now.date())
    }
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

type MotionFrame = Result<MotionSample, ReadError>;
type PulseFrame = Result<PulseSample, ReadError>;

/// Producer side of a simulated inertial sensor.
pub struct SimMotionHandle {
    tx: Sender<MotionFrame>,
}

impl SimMotionHandle {
    /// Enqueue one reading. Silently dropped if the FIFO is full, like a
    /// real sensor FIFO overrun.
    pub fn push(&self, magnitude_g: f32, timestamp_ms: Millis) {
        let _ = self.tx.try_send(Ok(MotionSample::new(magnitude_g, timestamp_ms)));
    }

    /// Enqueue a transient read fault.
    pub fn push_fault(&self) {
        let _ = self
            .tx
            .try_send(Err(ReadError::Transient("injected fault".to_string())));
    }
}

/// Consumer side of a simulated inertial sensor.
pub struct SimMotionSource {
    rx: Receiver<MotionFrame>,
    present: bool,
}

/// Create a simulated motion sensor pair. `present: false` makes the probe
/// fail, for exercising fatal-init handling.
pub fn sim_motion(present: bool) -> (SimMotionHandle, SimMotionSource) {
    let (tx, rx) = bounded(SIM_FIFO_DEPTH);
    (SimMotionHandle { tx }, SimMotionSource { rx, present })
}

impl MotionSource for SimMotionSource {
    fn probe(&mut self) -> Result<(), ProbeError> {
        if self.present {
            Ok(())
        } else {
            Err(ProbeError::NotPresent)
        }
    }

    fn interrupt_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read_magnitude(&mut self) -> Result<MotionSample, ReadError> {
        match self.rx.try_recv() {
            Ok(frame) => frame,
            Err(_) => Err(ReadError::NotReady),
        }
    }
}

/// Producer side of a simulated optical pulse sensor.
pub struct SimPulseHandle {
    tx: Sender<PulseFrame>,
}

impl SimPulseHandle {
    pub fn push(&self, ir: u32, red: u32, timestamp_ms: Millis) {
        let _ = self.tx.try_send(Ok(PulseSample::new(ir, red, timestamp_ms)));
    }

    pub fn push_fault(&self) {
        let _ = self
            .tx
            .try_send(Err(ReadError::Transient("injected fault".to_string())));
    }
}

/// Consumer side of a simulated optical pulse sensor.
pub struct SimPulseSource {
    rx: Receiver<PulseFrame>,
    present: bool,
}

pub fn sim_pulse(present: bool) -> (SimPulseHandle, SimPulseSource) {
    let (tx, rx) = bounded(SIM_FIFO_DEPTH);
    (SimPulseHandle { tx }, SimPulseSource { rx, present })
}

impl PulseSource for SimPulseSource {
    fn probe(&mut self) -> Result<(), ProbeError> {
        if self.present {
            Ok(())
        } else {
            Err(ProbeError::NotPresent)
        }
    }

    fn interrupt_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    fn read_pulse(&mut self) -> Result<PulseSample, ReadError> {
        match self.rx.try_recv() {
            Ok(frame) => frame,
            Err(_) => Err(ReadError::NotReady),
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// What the simulated display was asked to show.
#[derive(Debug, Clone)]
pub enum DisplayEvent {
    Status(SystemState),
    Result(HeartRateRecord),
    Fault(String),
}

/// A display that records everything shown on it.
pub struct SimDisplay {
    events: Arc<Mutex<Vec<DisplayEvent>>>,
}

impl SimDisplay {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle for inspecting what was shown.
    pub fn events_handle(&self) -> Arc<Mutex<Vec<DisplayEvent>>> {
        Arc::clone(&self.events)
    }

    fn push(&self, event: DisplayEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Default for SimDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SimDisplay {
    fn show_status(&mut self, state: SystemState) {
        self.push(DisplayEvent::Status(state));
    }

    fn show_result(&mut self, record: &HeartRateRecord) {
        self.push(DisplayEvent::Result(record.clone()));
    }

    fn show_fault(&mut self, message: &str) {
        self.push(DisplayEvent::Fault(message.to_string()));
    }
}

/// A display that prints to stdout, for the host `run` command.
pub struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn show_status(&mut self, state: SystemState) {
        println!("[display] {}", state.label());
    }

    fn show_result(&mut self, record: &HeartRateRecord) {
        println!(
            "[display] {:.1} BPM ({} beats, {:?})",
            record.averaged_bpm, record.sample_count, record.confidence
        );
    }

    fn show_fault(&mut self, message: &str) {
        println!("[display] FAULT: {message}");
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// An in-memory store whose availability can be toggled, for exercising the
/// storage retry path.
pub struct MemoryStore {
    records: Arc<Mutex<Vec<HeartRateRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared handle for inspecting persisted records.
    pub fn records_handle(&self) -> Arc<Mutex<Vec<HeartRateRecord>>> {
        Arc::clone(&self.records)
    }

    /// Shared toggle: `true` makes every operation fail with
    /// `StoreError::Unavailable`.
    pub fn availability_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.unavailable)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for MemoryStore {
    fn append_record(&mut self, record: &HeartRateRecord) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.records
            .lock()
            .map_err(|_| StoreError::Io("store poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn load_today_count(&mut self, date: chrono::NaiveDate) -> Result<u32, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Io("store poisoned".to_string()))?;
        Ok(records
            .iter()
            .filter(|r| r.taken_at.date_naive() == date)
            .count() as u32)
    }
}

// ---------------------------------------------------------------------------
// Wearer rig
// ---------------------------------------------------------------------------

/// Parameters of the synthetic wearer driven by the `run` command.
#[derive(Debug, Clone)]
pub struct WearerScenario {
    /// When the wearer starts moving (monotonic ms).
    pub wake_burst_start_ms: Millis,
    /// How long the motion burst lasts.
    pub wake_burst_duration_ms: Millis,
    /// Burst acceleration magnitude.
    pub burst_magnitude_g: f32,
    /// Resting acceleration magnitude.
    pub idle_magnitude_g: f32,
    /// Simulated heart rate.
    pub heart_rate_bpm: u32,
    /// Inertial sensor output period.
    pub motion_sample_period_ms: Millis,
    /// Optical sensor output period.
    pub pulse_sample_period_ms: Millis,
}

impl Default for WearerScenario {
    fn default() -> Self {
        Self {
            wake_burst_start_ms: 10 * 60 * 1_000,
            wake_burst_duration_ms: 8_000,
            burst_magnitude_g: 2.5,
            idle_magnitude_g: 0.1,
            heart_rate_bpm: 72,
            motion_sample_period_ms: 50,
            pulse_sample_period_ms: 10,
        }
    }
}

impl WearerScenario {
    fn in_burst(&self, now: Millis) -> bool {
        now >= self.wake_burst_start_ms
            && now < self.wake_burst_start_ms + self.wake_burst_duration_ms
    }

    fn ir_at(&self, now: Millis) -> u32 {
        let beat_period = 60_000 / Millis::from(self.heart_rate_bpm.max(1));
        // One bright sample per beat period; flat in between.
        if now % beat_period < self.pulse_sample_period_ms {
            51_200
        } else {
            50_000
        }
    }
}

/// Drives simulated sensors from a [`WearerScenario`], honoring the
/// orchestrator's sleep plans: a disarmed source generates nothing the CPU
/// would see, and a sample on an armed source cancels the sleep timer early.
pub struct SimRig {
    clock: SimClock,
    motion: SimMotionHandle,
    pulse: SimPulseHandle,
    scenario: WearerScenario,
    wake_threshold_g: f32,
    next_motion_due_ms: Millis,
    next_pulse_due_ms: Millis,
}

/// Time granted per iteration when the CPU stays active.
const ACTIVE_QUANTUM_MS: Millis = 10;

impl SimRig {
    pub fn new(
        clock: SimClock,
        motion: SimMotionHandle,
        pulse: SimPulseHandle,
        scenario: WearerScenario,
        wake_threshold_g: f32,
    ) -> Self {
        let next_motion_due_ms = scenario.motion_sample_period_ms;
        let next_pulse_due_ms = scenario.pulse_sample_period_ms;
        Self {
            clock,
            motion,
            pulse,
            scenario,
            wake_threshold_g,
            next_motion_due_ms,
            next_pulse_due_ms,
        }
    }

    /// Advance simulated time through one sleep plan: the full duration for
    /// a suspension (unless an armed interrupt fires first), or one quantum
    /// for an active iteration.
    pub fn advance(&mut self, plan: &SleepPlan) {
        let start = self.clock.now_ms();
        let requested = plan.duration.as_millis() as Millis;
        let target = start + requested.max(ACTIVE_QUANTUM_MS);

        loop {
            let next_due = self.next_motion_due_ms.min(self.next_pulse_due_ms);
            if next_due > target {
                self.clock.advance_to(target);
                return;
            }
            self.clock.advance_to(next_due);
            let woke = self.inject_at(next_due, plan);
            if woke && plan.mode.is_some() {
                // The armed interrupt cancels the remaining sleep.
                return;
            }
        }
    }

    fn inject_at(&mut self, now: Millis, plan: &SleepPlan) -> bool {
        let sleeping = plan.mode.is_some();
        let mut woke = false;

        if self.next_motion_due_ms == now {
            self.next_motion_due_ms += self.scenario.motion_sample_period_ms;
            let magnitude = if self.scenario.in_burst(now) {
                self.scenario.burst_magnitude_g
            } else {
                self.scenario.idle_magnitude_g
            };
            // While suspended, only the sensor's wake-on-motion threshold
            // raises the interrupt; sub-threshold readings are never seen.
            if plan.armed.motion && (!sleeping || magnitude >= self.wake_threshold_g) {
                self.motion.push(magnitude, now);
                woke = sleeping;
            }
        }

        if self.next_pulse_due_ms == now {
            self.next_pulse_due_ms += self.scenario.pulse_sample_period_ms;
            if plan.armed.pulse {
                self.pulse.push(self.scenario.ir_at(now), 48_000, now);
                woke = woke || sleeping;
            }
        }

        woke
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn test_sim_clock_advances_wall_time() {
        let clock = SimClock::new(base(6, 0));
        assert_eq!(clock.wall_clock().hour, 6);

        clock.advance(90 * 60 * 1_000);
        let wall = clock.wall_clock();
        assert_eq!(wall.hour, 7);
        assert_eq!(wall.minute, 30);
        assert_eq!(clock.now_ms(), 90 * 60 * 1_000);
    }

    #[test]
    fn test_sim_clock_handles_share_time() {
        let clock = SimClock::new(base(6, 0));
        let handle = clock.clone();
        handle.advance(1_000);
        assert_eq!(clock.now_ms(), 1_000);
    }

    #[test]
    fn test_sim_motion_queue_and_pending_flag() {
        let (handle, mut source) = sim_motion(true);
        assert!(!source.interrupt_pending());

        handle.push(2.5, 100);
        assert!(source.interrupt_pending());

        let sample = source.read_magnitude().unwrap();
        assert_eq!(sample.timestamp_ms, 100);
        assert!(!source.interrupt_pending());
        assert!(matches!(
            source.read_magnitude(),
            Err(ReadError::NotReady)
        ));
    }

    #[test]
    fn test_sim_motion_fault_injection() {
        let (handle, mut source) = sim_motion(true);
        handle.push_fault();
        assert!(source.interrupt_pending());
        assert!(matches!(
            source.read_magnitude(),
            Err(ReadError::Transient(_))
        ));
    }

    #[test]
    fn test_absent_sensor_fails_probe() {
        let (_handle, mut source) = sim_pulse(false);
        assert!(matches!(source.probe(), Err(ProbeError::NotPresent)));
    }

    #[test]
    fn test_memory_store_availability_toggle() {
        let mut store = MemoryStore::new();
        let toggle = store.availability_handle();
        let record = HeartRateRecord {
            taken_at: chrono::Utc::now(),
            averaged_bpm: 72.0,
            sample_count: 30,
            confidence: crate::core::heartrate::Confidence::High,
        };

        toggle.store(true, Ordering::SeqCst);
        assert!(matches!(
            store.append_record(&record),
            Err(StoreError::Unavailable)
        ));

        toggle.store(false, Ordering::SeqCst);
        assert!(store.append_record(&record).is_ok());
        assert_eq!(
            store.load_today_count(record.taken_at.date_naive()).unwrap(),
            1
        );
    }
}
