//! # Watch Table
//!
//! Per-pipeline map from a key to the last-observed modification time, used
//! to tell "new" from "updated" from "already handled".
//!
//! ## Overview
//!
//! A key is processed when it has never been recorded, or when its observed
//! mtime exceeds the recorded one by more than the configured tolerance. The
//! tolerance absorbs clock/storage skew between the object store and local
//! disk; the sweeper runs with zero tolerance because it only ever compares
//! local mtimes against themselves.
//!
//! Overwriting a key with the same name and newer content is a legitimate
//! re-processing trigger: upstream producers resubmit manifests under the
//! same name. Recorded times are never decremented, so an out-of-order
//! older observation can not re-arm a key.
//!
//! Each pipeline owns its table; nothing here is shared across loops.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Key → last-seen modification time, with skew tolerance
#[derive(Debug)]
pub struct WatchTable {
    tolerance: chrono::Duration,
    seen: HashMap<String, DateTime<Utc>>,
}

impl WatchTable {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance: chrono::Duration::from_std(tolerance)
                .unwrap_or_else(|_| chrono::Duration::seconds(1)),
            seen: HashMap::new(),
        }
    }

    /// Whether `key` should be (re)processed given the observed mtime
    pub fn is_new_or_updated(&self, key: &str, observed: DateTime<Utc>) -> bool {
        match self.seen.get(key) {
            None => true,
            Some(recorded) => observed > *recorded + self.tolerance,
        }
    }

    /// Record an observation; keeps the newer of recorded and observed
    pub fn record(&mut self, key: &str, observed: DateTime<Utc>) {
        match self.seen.get_mut(key) {
            Some(recorded) if *recorded >= observed => {}
            Some(recorded) => *recorded = observed,
            None => {
                self.seen.insert(key.to_string(), observed);
            }
        }
    }

    /// Drop a key so its next observation counts as new again
    pub fn forget(&mut self, key: &str) {
        self.seen.remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_754_400_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_unseen_key_is_new() {
        let table = WatchTable::new(Duration::from_secs(1));
        assert!(table.is_new_or_updated("a.json", ts(0)));
    }

    #[test]
    fn test_same_mtime_is_handled() {
        let mut table = WatchTable::new(Duration::from_secs(1));
        table.record("a.json", ts(0));
        assert!(!table.is_new_or_updated("a.json", ts(0)));
    }

    #[test]
    fn test_skew_within_tolerance_is_handled() {
        let mut table = WatchTable::new(Duration::from_secs(1));
        table.record("a.json", ts(0));
        assert!(!table.is_new_or_updated("a.json", ts(1)));
    }

    #[test]
    fn test_newer_beyond_tolerance_rearms() {
        let mut table = WatchTable::new(Duration::from_secs(1));
        table.record("a.json", ts(0));
        assert!(table.is_new_or_updated("a.json", ts(2)));
    }

    #[test]
    fn test_zero_tolerance_rearms_on_any_strictly_newer() {
        let mut table = WatchTable::new(Duration::ZERO);
        table.record("a.json", ts(0));
        assert!(!table.is_new_or_updated("a.json", ts(0)));
        assert!(table.is_new_or_updated("a.json", ts(1)));
    }

    #[test]
    fn test_record_never_decrements() {
        let mut table = WatchTable::new(Duration::ZERO);
        table.record("a.json", ts(10));
        table.record("a.json", ts(5));
        assert!(!table.is_new_or_updated("a.json", ts(10)));
        assert!(table.is_new_or_updated("a.json", ts(11)));
    }

    #[test]
    fn test_forget_rearms() {
        let mut table = WatchTable::new(Duration::from_secs(1));
        table.record("a.json", ts(0));
        table.forget("a.json");
        assert!(table.is_new_or_updated("a.json", ts(0)));
        assert!(table.is_empty());
    }
}
