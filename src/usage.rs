//! Usage ledger: per-day, per-model request accounting.
//!
//! Tracks how many requests each model served today and whether the
//! provider reported quota exhaustion. The relay consults and updates
//! this after every call; the settings surface reads it for statistics.
//!
//! `limit_reached` is monotonic within a date: once a model trips its
//! quota, later successes do not clear the flag. Only saving a fresh
//! API key (or the date rolling over) resets it.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Composite key: (date, model_id).
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageKey {
    pub date: NaiveDate,
    pub model_id: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub count: u32,
    pub limit_reached: bool,
}

/// A point-in-time view of one (date, model) counter.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSnapshot {
    pub date: NaiveDate,
    pub model_id: String,
    pub count: u32,
    pub limit_reached: bool,
}

#[derive(Debug, Default)]
pub struct UsageLedger {
    records: HashMap<UsageKey, UsageRecord>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// Record the outcome of one provider call. A quota-exceeded signal
    /// sets the flag and leaves the count untouched; a success increments.
    pub fn update(&mut self, model_id: &str, quota_exceeded: bool) {
        let key = UsageKey {
            date: Self::today(),
            model_id: model_id.into(),
        };
        let record = self.records.entry(key).or_default();
        if quota_exceeded {
            record.limit_reached = true;
        } else {
            record.count += 1;
        }
    }

    pub fn record(&self, model_id: &str) -> UsageRecord {
        let key = UsageKey {
            date: Self::today(),
            model_id: model_id.into(),
        };
        self.records.get(&key).copied().unwrap_or_default()
    }

    pub fn limit_reached(&self, model_id: &str) -> bool {
        self.record(model_id).limit_reached
    }

    /// Clear today's `limit_reached` flags. Invoked when the user saves an
    /// API key, so a fresh credential never inherits a stale exhausted state.
    pub fn clear_today_limits(&mut self) {
        let today = Self::today();
        for (key, record) in self.records.iter_mut() {
            if key.date == today {
                record.limit_reached = false;
            }
        }
    }

    pub fn snapshot(&self, date: Option<NaiveDate>) -> Vec<UsageSnapshot> {
        let mut rows: Vec<_> = self
            .records
            .iter()
            .filter(|(key, _)| date.map(|d| key.date == d).unwrap_or(true))
            .map(|(key, record)| UsageSnapshot {
                date: key.date,
                model_id: key.model_id.clone(),
                count: record.count,
                limit_reached: record.limit_reached,
            })
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(a.model_id.cmp(&b.model_id)));
        rows
    }

    // ── Persistence glue ──

    pub fn export(&self) -> Vec<(UsageKey, UsageRecord)> {
        self.records
            .iter()
            .map(|(k, r)| (k.clone(), *r))
            .collect()
    }

    pub fn import(&mut self, rows: Vec<(UsageKey, UsageRecord)>) {
        self.records = rows.into_iter().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_increments() {
        let mut ledger = UsageLedger::new();
        ledger.update("gemini-2.5-flash", false);
        ledger.update("gemini-2.5-flash", false);
        let record = ledger.record("gemini-2.5-flash");
        assert_eq!(record.count, 2);
        assert!(!record.limit_reached);
    }

    #[test]
    fn test_quota_exceeded_sets_flag_without_counting() {
        let mut ledger = UsageLedger::new();
        ledger.update("gemini-2.5-flash", true);
        ledger.update("gemini-2.5-flash", true);
        let record = ledger.record("gemini-2.5-flash");
        assert_eq!(record.count, 0);
        assert!(record.limit_reached);
    }

    #[test]
    fn test_flag_is_monotonic_within_day() {
        let mut ledger = UsageLedger::new();
        ledger.update("deepseek-chat", true);
        // A later success still counts but does not clear the flag.
        ledger.update("deepseek-chat", false);
        let record = ledger.record("deepseek-chat");
        assert_eq!(record.count, 1);
        assert!(record.limit_reached);
    }

    #[test]
    fn test_clear_today_limits() {
        let mut ledger = UsageLedger::new();
        ledger.update("deepseek-chat", true);
        assert!(ledger.limit_reached("deepseek-chat"));
        ledger.clear_today_limits();
        assert!(!ledger.limit_reached("deepseek-chat"));
        // Counts survive the reset.
        ledger.update("deepseek-chat", false);
        assert_eq!(ledger.record("deepseek-chat").count, 1);
    }

    #[test]
    fn test_models_tracked_independently() {
        let mut ledger = UsageLedger::new();
        ledger.update("gemini-2.5-flash", true);
        ledger.update("deepseek-chat", false);
        assert!(ledger.limit_reached("gemini-2.5-flash"));
        assert!(!ledger.limit_reached("deepseek-chat"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut ledger = UsageLedger::new();
        ledger.update("gemini-2.5-flash", false);
        ledger.update("deepseek-chat", true);

        let exported = ledger.export();
        let mut restored = UsageLedger::new();
        restored.import(exported);
        assert_eq!(restored.record("gemini-2.5-flash").count, 1);
        assert!(restored.limit_reached("deepseek-chat"));
    }
}
