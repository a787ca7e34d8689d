//! Bounded per-day record retention.
//!
//! [`DailyLog`] keeps today's heart-rate records in order, capped at the
//! configured retention limit; on overflow the oldest record is evicted so
//! the newest measurement always lands. When the calendar day changes the
//! finished sequence is handed back to the caller for archival and a fresh
//! one begins.
//!
//! The log also carries the persistence retry queue: records that could not
//! be written because the storage medium was unavailable wait here (bounded
//! by the same cap) and are retried on the next append opportunity, so
//! storage trouble never blocks the state machine.

use std::collections::VecDeque;

use chrono::NaiveDate;
use tracing::info;

use crate::core::heartrate::HeartRateRecord;

/// A finished day's records, handed back on rollover for archival.
#[derive(Debug, Clone)]
pub struct ArchivedDay {
    pub date: NaiveDate,
    pub records: Vec<HeartRateRecord>,
}

/// Ordered, bounded sequence of one day's records.
pub struct DailyLog {
    cap: usize,
    day: NaiveDate,
    records: VecDeque<HeartRateRecord>,
    unsynced: VecDeque<HeartRateRecord>,
}

impl DailyLog {
    pub fn new(cap: usize, today: NaiveDate) -> Self {
        Self {
            cap,
            day: today,
            records: VecDeque::new(),
            unsynced: VecDeque::new(),
        }
    }

    /// The day this log currently covers.
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Today's records, oldest first.
    pub fn current_day(&self) -> impl Iterator<Item = &HeartRateRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// If the calendar day has changed, archive the finished sequence and
    /// start fresh.
    pub fn rollover(&mut self, today: NaiveDate) -> Option<ArchivedDay> {
        if today == self.day {
            return None;
        }
        let archived = ArchivedDay {
            date: self.day,
            records: self.records.drain(..).collect(),
        };
        info!(
            day = %archived.date,
            records = archived.records.len(),
            "day rolled over"
        );
        self.day = today;
        Some(archived)
    }

    /// Append a record, evicting the oldest if the cap is reached. Returns
    /// the evicted record, if any.
    pub fn append(&mut self, record: HeartRateRecord) -> Option<HeartRateRecord> {
        let evicted = if self.records.len() >= self.cap {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    /// Hold a record whose persistence failed, for retry. Bounded by the
    /// retention cap; the oldest waiting record is dropped on overflow.
    pub fn queue_unsynced(&mut self, record: HeartRateRecord) {
        if self.unsynced.len() >= self.cap {
            self.unsynced.pop_front();
        }
        self.unsynced.push_back(record);
    }

    /// Take all records awaiting a persistence retry.
    pub fn take_unsynced(&mut self) -> Vec<HeartRateRecord> {
        self.unsynced.drain(..).collect()
    }

    pub fn unsynced_len(&self) -> usize {
        self.unsynced.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::heartrate::Confidence;
    use chrono::Utc;

    fn record(bpm: f64) -> HeartRateRecord {
        HeartRateRecord {
            taken_at: Utc::now(),
            averaged_bpm: bpm,
            sample_count: 30,
            confidence: Confidence::High,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_eleven_appends_keep_last_ten() {
        let mut log = DailyLog::new(10, day(1));
        let mut evicted = Vec::new();
        for i in 1..=11 {
            if let Some(e) = log.append(record(f64::from(i))) {
                evicted.push(e);
            }
        }
        assert_eq!(log.len(), 10);
        // Record #1 was evicted; #2..=#11 remain in order.
        assert_eq!(evicted.len(), 1);
        assert!((evicted[0].averaged_bpm - 1.0).abs() < f64::EPSILON);
        let bpms: Vec<f64> = log.current_day().map(|r| r.averaged_bpm).collect();
        assert_eq!(bpms, (2..=11).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_rollover_archives_and_clears() {
        let mut log = DailyLog::new(10, day(1));
        log.append(record(70.0));
        log.append(record(72.0));

        assert!(log.rollover(day(1)).is_none());

        let archived = log.rollover(day(2)).unwrap();
        assert_eq!(archived.date, day(1));
        assert_eq!(archived.records.len(), 2);
        assert!(log.is_empty());
        assert_eq!(log.day(), day(2));
    }

    #[test]
    fn test_unsynced_queue_round_trip() {
        let mut log = DailyLog::new(10, day(1));
        log.queue_unsynced(record(70.0));
        log.queue_unsynced(record(72.0));
        assert_eq!(log.unsynced_len(), 2);

        let retry = log.take_unsynced();
        assert_eq!(retry.len(), 2);
        assert_eq!(log.unsynced_len(), 0);
    }

    #[test]
    fn test_unsynced_queue_is_bounded() {
        let mut log = DailyLog::new(3, day(1));
        for i in 1..=5 {
            log.queue_unsynced(record(f64::from(i)));
        }
        assert_eq!(log.unsynced_len(), 3);
        let bpms: Vec<f64> = log.take_unsynced().iter().map(|r| r.averaged_bpm).collect();
        assert_eq!(bpms, vec![3.0, 4.0, 5.0]);
    }
}
