//! Heart-rate sampling: beat detection and interval averaging.
//!
//! [`HeartRateSampler`] runs a peak detector over the infrared channel of the
//! optical sensor. The signal baseline (the DC level, which drifts with skin
//! contact and temperature) is tracked with an exponential moving average; a
//! beat is a local maximum of the deviation above a dynamic trigger level
//! derived from recent beat amplitudes. Inter-beat intervals implying
//! physiologically impossible rates are rejected rather than averaged.
//!
//! The sampler accumulates intervals until the orchestrator closes the
//! measurement window: at the configured beat count, or at the window
//! timeout, whichever comes first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::config::Config;
use crate::hal::types::{Millis, PulseSample};

/// Smoothing factor for the IR baseline (DC) estimate.
const BASELINE_ALPHA: f64 = 0.05;

/// Decay factor for the beat-amplitude envelope.
const ENVELOPE_DECAY: f64 = 0.8;

/// Minimum deviation above baseline that can trigger a beat (raw counts).
/// Keeps the detector quiet on sensor noise before any beat has been seen.
const MIN_BEAT_DEVIATION: f64 = 50.0;

/// Fraction of the amplitude envelope used as the trigger level.
const TRIGGER_FRACTION: f64 = 0.5;

/// Fraction of the trigger level the signal must fall below to end a pulse.
const RELEASE_FRACTION: f64 = 0.5;

/// Fastest plausible heart rate; shorter intervals are sensor ripple.
const MAX_PLAUSIBLE_BPM: f64 = 220.0;

/// Slowest plausible heart rate; longer intervals are contact gaps.
const MIN_PLAUSIBLE_BPM: f64 = 30.0;

/// Reliability grade of an averaged measurement, derived from how many beats
/// contributed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Grade from the number of beats averaged: <10 Low, 10-20 Medium,
    /// >20 High.
    pub fn from_beats(beats: u32) -> Self {
        if beats < 10 {
            Confidence::Low
        } else if beats <= 20 {
            Confidence::Medium
        } else {
            Confidence::High
        }
    }
}

/// One completed heart-rate measurement. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartRateRecord {
    /// Wall-clock time the measurement window closed.
    pub taken_at: DateTime<Utc>,
    /// Average heart rate over the collected intervals.
    pub averaged_bpm: f64,
    /// Number of beats that contributed.
    pub sample_count: u32,
    /// Reliability grade.
    pub confidence: Confidence,
}

/// Beat detector plus bounded interval buffer.
pub struct HeartRateSampler {
    max_intervals: usize,
    min_interval_ms: f64,
    max_interval_ms: f64,
    /// EMA of the raw IR level; `None` until the first sample seeds it.
    baseline: Option<f64>,
    /// EMA of recent beat amplitudes; drives the dynamic trigger level.
    envelope: f64,
    in_pulse: bool,
    peak_deviation: f64,
    peak_ms: Millis,
    last_beat_ms: Option<Millis>,
    intervals_ms: VecDeque<f64>,
    beats: u32,
}

impl HeartRateSampler {
    pub fn new(config: &Config) -> Self {
        Self {
            max_intervals: config.hr_average_samples as usize,
            min_interval_ms: 60_000.0 / MAX_PLAUSIBLE_BPM,
            max_interval_ms: 60_000.0 / MIN_PLAUSIBLE_BPM,
            baseline: None,
            envelope: 0.0,
            in_pulse: false,
            peak_deviation: 0.0,
            peak_ms: 0,
            last_beat_ms: None,
            intervals_ms: VecDeque::new(),
            beats: 0,
        }
    }

    /// Number of beats detected in the current window.
    pub fn beats(&self) -> u32 {
        self.beats
    }

    /// Consume one optical sample; returns whether a beat was registered.
    pub fn feed(&mut self, sample: &PulseSample) -> bool {
        let ir = f64::from(sample.ir);

        let baseline = match self.baseline {
            None => {
                self.baseline = Some(ir);
                return false;
            }
            Some(b) => {
                let next = b + (ir - b) * BASELINE_ALPHA;
                self.baseline = Some(next);
                next
            }
        };

        let deviation = ir - baseline;
        let trigger = self.trigger_level();

        if self.in_pulse {
            if deviation > self.peak_deviation {
                self.peak_deviation = deviation;
                self.peak_ms = sample.timestamp_ms;
            }
            if deviation < trigger * RELEASE_FRACTION {
                self.in_pulse = false;
                let peak_ms = self.peak_ms;
                let peak_deviation = self.peak_deviation;
                return self.register_beat(peak_ms, peak_deviation);
            }
            false
        } else if deviation >= trigger {
            self.in_pulse = true;
            self.peak_deviation = deviation;
            self.peak_ms = sample.timestamp_ms;
            false
        } else {
            false
        }
    }

    /// Average over whatever intervals are present, or `None` when no rate
    /// can be computed yet (fewer than two beats).
    pub fn current_average(&self, taken_at: DateTime<Utc>) -> Option<HeartRateRecord> {
        if self.intervals_ms.is_empty() {
            return None;
        }
        let mean_ms = self.intervals_ms.iter().mean();
        if mean_ms <= 0.0 {
            return None;
        }
        Some(HeartRateRecord {
            taken_at,
            averaged_bpm: 60_000.0 / mean_ms,
            sample_count: self.beats,
            confidence: Confidence::from_beats(self.beats),
        })
    }

    /// Spread of the collected intervals, for signal-quality logging.
    pub fn interval_jitter_ms(&self) -> f64 {
        if self.intervals_ms.len() < 2 {
            return 0.0;
        }
        self.intervals_ms.iter().std_dev()
    }

    /// Start a fresh measurement window.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.envelope = 0.0;
        self.in_pulse = false;
        self.peak_deviation = 0.0;
        self.peak_ms = 0;
        self.last_beat_ms = None;
        self.intervals_ms.clear();
        self.beats = 0;
    }

    fn trigger_level(&self) -> f64 {
        (self.envelope * TRIGGER_FRACTION).max(MIN_BEAT_DEVIATION)
    }

    fn register_beat(&mut self, at_ms: Millis, amplitude: f64) -> bool {
        self.envelope = if self.envelope == 0.0 {
            amplitude
        } else {
            ENVELOPE_DECAY * self.envelope + (1.0 - ENVELOPE_DECAY) * amplitude
        };

        match self.last_beat_ms {
            None => {
                self.last_beat_ms = Some(at_ms);
                self.beats += 1;
                true
            }
            Some(last) => {
                let interval = at_ms.saturating_sub(last) as f64;
                if interval < self.min_interval_ms {
                    // Implies an impossible rate: ripple, not a beat.
                    debug!(interval_ms = interval, "rejected too-short interval");
                    false
                } else if interval > self.max_interval_ms {
                    // Contact gap: the beat is real but the interval is not.
                    debug!(interval_ms = interval, "interval gap, restarting");
                    self.last_beat_ms = Some(at_ms);
                    self.beats += 1;
                    true
                } else {
                    self.last_beat_ms = Some(at_ms);
                    self.intervals_ms.push_back(interval);
                    if self.intervals_ms.len() > self.max_intervals {
                        self.intervals_ms.pop_front();
                    }
                    self.beats += 1;
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT_IR: u32 = 50_000;
    const BEAT_IR: u32 = 51_200;

    fn sampler() -> HeartRateSampler {
        HeartRateSampler::new(&Config::default())
    }

    /// Feed a 100 Hz waveform with an impulse beat every `interval_ms`,
    /// starting at `first_beat_ms`, until `duration_ms`.
    fn feed_waveform(
        s: &mut HeartRateSampler,
        duration_ms: Millis,
        first_beat_ms: Millis,
        interval_ms: Millis,
    ) -> u32 {
        let mut detected = 0;
        for ts in (0..=duration_ms).step_by(10) {
            let ir = if ts >= first_beat_ms && (ts - first_beat_ms) % interval_ms == 0 {
                BEAT_IR
            } else {
                FLAT_IR
            };
            if s.feed(&PulseSample::new(ir, 48_000, ts)) {
                detected += 1;
            }
        }
        detected
    }

    #[test]
    fn test_confidence_grading() {
        assert_eq!(Confidence::from_beats(5), Confidence::Low);
        assert_eq!(Confidence::from_beats(9), Confidence::Low);
        assert_eq!(Confidence::from_beats(10), Confidence::Medium);
        assert_eq!(Confidence::from_beats(15), Confidence::Medium);
        assert_eq!(Confidence::from_beats(20), Confidence::Medium);
        assert_eq!(Confidence::from_beats(21), Confidence::High);
        assert_eq!(Confidence::from_beats(30), Confidence::High);
    }

    #[test]
    fn test_thirty_beats_at_600ms_average_100_bpm() {
        let mut s = sampler();
        // 30 impulses at 600 ms spacing, first at 1000 ms; run a little past
        // the last beat so its falling edge is seen.
        let detected = feed_waveform(&mut s, 1_000 + 29 * 600 + 100, 1_000, 600);
        assert_eq!(detected, 30);
        assert_eq!(s.beats(), 30);

        let record = s.current_average(Utc::now()).unwrap();
        assert_eq!(record.sample_count, 30);
        assert_eq!(record.confidence, Confidence::High);
        assert!((record.averaged_bpm - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_fifteen_beats_medium_confidence() {
        let mut s = sampler();
        feed_waveform(&mut s, 1_000 + 14 * 600 + 100, 1_000, 600);
        assert_eq!(s.beats(), 15);
        let record = s.current_average(Utc::now()).unwrap();
        assert_eq!(record.confidence, Confidence::Medium);
    }

    #[test]
    fn test_five_beats_low_confidence() {
        let mut s = sampler();
        feed_waveform(&mut s, 1_000 + 4 * 600 + 100, 1_000, 600);
        assert_eq!(s.beats(), 5);
        let record = s.current_average(Utc::now()).unwrap();
        assert_eq!(record.confidence, Confidence::Low);
    }

    #[test]
    fn test_no_beats_no_record() {
        let mut s = sampler();
        for ts in (0..=5_000).step_by(10) {
            assert!(!s.feed(&PulseSample::new(FLAT_IR, 48_000, ts)));
        }
        assert_eq!(s.beats(), 0);
        assert!(s.current_average(Utc::now()).is_none());
    }

    #[test]
    fn test_single_beat_has_no_rate() {
        let mut s = sampler();
        feed_waveform(&mut s, 2_000, 1_000, 10_000);
        assert_eq!(s.beats(), 1);
        assert!(s.current_average(Utc::now()).is_none());
    }

    #[test]
    fn test_impossibly_fast_interval_rejected() {
        let mut s = sampler();
        // Impulses 100 ms apart imply 600 BPM; none may count as intervals.
        feed_waveform(&mut s, 1_250, 1_000, 100);
        let record = s.current_average(Utc::now());
        // Every interval was rejected, so no average exists.
        assert!(record.is_none());
    }

    #[test]
    fn test_contact_gap_does_not_pollute_average() {
        let mut s = sampler();
        // 5 beats at 600 ms, then a 5 s gap, then 5 more at 600 ms.
        feed_waveform(&mut s, 1_000 + 4 * 600 + 100, 1_000, 600);
        let resume = 1_000 + 4 * 600 + 5_000;
        for ts in ((1_000 + 4 * 600 + 110)..=(resume + 4 * 600 + 100)).step_by(10) {
            let ir = if ts >= resume && (ts - resume) % 600 == 0 {
                BEAT_IR
            } else {
                FLAT_IR
            };
            s.feed(&PulseSample::new(ir, 48_000, ts));
        }
        assert_eq!(s.beats(), 10);
        let record = s.current_average(Utc::now()).unwrap();
        // The 5 s gap was dropped; only 600 ms intervals were averaged.
        assert!((record.averaged_bpm - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut s = sampler();
        feed_waveform(&mut s, 1_000 + 9 * 600 + 100, 1_000, 600);
        assert_eq!(s.beats(), 10);

        s.reset();
        assert_eq!(s.beats(), 0);
        assert!(s.current_average(Utc::now()).is_none());
    }
}
