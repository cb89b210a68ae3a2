use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sequencer::{Hand, TestType};

/// Summary of one finished test. Built once by the sequencer and handed off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub date: DateTime<Utc>,
    pub test_type: TestType,
    pub peak: f64,
    pub average_force: f64,
    /// Wall-clock seconds between start and finish, rounded.
    pub duration_secs: u64,
    pub reps: u32,
    pub hand: Hand,
    pub left_peak: f64,
    pub right_peak: f64,
}

impl SessionRecord {
    /// Left/right peak ratio, only meaningful when both hands pulled.
    pub fn hand_ratio(&self) -> Option<f64> {
        if self.left_peak > 0.0 && self.right_peak > 0.0 {
            Some(self.left_peak / self.right_peak)
        } else {
            None
        }
    }
}

/// Durable destination for finished sessions.
pub trait SessionSink {
    fn persist(&mut self, record: &SessionRecord) -> Result<()>;
}

/// Keeps records in memory; cloned handles share the same list.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionSink {
    records: Arc<Mutex<Vec<SessionRecord>>>,
}

impl MemorySessionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl SessionSink for MemorySessionSink {
    fn persist(&mut self, record: &SessionRecord) -> Result<()> {
        if let Ok(mut r) = self.records.lock() {
            r.push(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(left: f64, right: f64) -> SessionRecord {
        SessionRecord {
            date: Utc::now(),
            test_type: TestType::Repeaters,
            peak: left.max(right),
            average_force: left.max(right) * 0.7,
            duration_secs: 42,
            reps: 2,
            hand: Hand::Both,
            left_peak: left,
            right_peak: right,
        }
    }

    #[test]
    fn hand_ratio_requires_both_sides() {
        assert_eq!(record(40.0, 0.0).hand_ratio(), None);
        assert_eq!(record(0.0, 40.0).hand_ratio(), None);
        let ratio = record(30.0, 40.0).hand_ratio().unwrap();
        assert!((ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn memory_sink_shares_records() {
        let probe = MemorySessionSink::new();
        let mut sink = probe.clone();
        sink.persist(&record(10.0, 12.0)).unwrap();
        assert_eq!(probe.records().len(), 1);
    }

    #[test]
    fn record_json_roundtrip_keeps_enums_lowercase() {
        let json = serde_json::to_string(&record(10.0, 12.0)).unwrap();
        assert!(json.contains("\"test_type\":\"repeaters\""));
        assert!(json.contains("\"hand\":\"both\""));
    }
}
