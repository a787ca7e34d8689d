//! JSON-lines record store for host deployments.
//!
//! Each persisted record is one JSON line stamped with a unique id and the
//! device id, so exports from several devices can be merged downstream.
//! Availability errors are reported as `StoreError::Unavailable` and the
//! caller retries later; this store never blocks the state machine.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::heartrate::HeartRateRecord;
use crate::hal::{PersistentStore, StoreError};

/// One persisted line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Unique record id.
    pub id: Uuid,
    /// Hostname-derived device id.
    pub device_id: String,
    #[serde(flatten)]
    pub record: HeartRateRecord,
}

/// Append-only JSON-lines store.
pub struct JsonStore {
    path: PathBuf,
    device_id: String,
}

impl JsonStore {
    /// Open a store at the given path. The file is created on first append.
    pub fn open(path: PathBuf) -> Self {
        let device_id = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-device".to_string());
        Self { path, device_id }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Read every stored record, skipping unparseable lines.
    pub fn load_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl PersistentStore for JsonStore {
    fn append_record(&mut self, record: &HeartRateRecord) -> Result<(), StoreError> {
        let stored = StoredRecord {
            id: Uuid::new_v4(),
            device_id: self.device_id.clone(),
            record: record.clone(),
        };
        let line = serde_json::to_string(&stored).map_err(|e| StoreError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| StoreError::Unavailable)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|_| StoreError::Unavailable)?;
        writeln!(file, "{line}").map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    fn load_today_count(&mut self, date: NaiveDate) -> Result<u32, StoreError> {
        let records = self.load_all()?;
        Ok(records
            .iter()
            .filter(|r| r.record.taken_at.date_naive() == date)
            .count() as u32)
    }
}
