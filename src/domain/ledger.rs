use crate::domain::models::{CalendarEvent, WeekMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count of placed sessions per template id for the current week.
///
/// Persisted as the `usedSessions` map. Counts only move through
/// [`SessionLedger::record`], [`SessionLedger::release`] and
/// [`SessionLedger::reset`], so a count never exceeds the quota it was
/// recorded against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SessionLedger {
    used: BTreeMap<String, u32>,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a CalendarEvent>) -> Self {
        let mut ledger = Self::new();
        for template_id in events
            .into_iter()
            .filter_map(CalendarEvent::local_template_id)
        {
            *ledger.used.entry(template_id.to_string()).or_insert(0) += 1;
        }
        ledger
    }

    pub fn used(&self, template_id: &str) -> u32 {
        self.used.get(template_id).copied().unwrap_or(0)
    }

    pub fn remaining(&self, template_id: &str, quota: u32) -> u32 {
        quota.saturating_sub(self.used(template_id))
    }

    /// Returns `false` and leaves the count untouched when the quota is used up.
    pub fn record(&mut self, template_id: &str, quota: u32) -> bool {
        if self.remaining(template_id, quota) == 0 {
            return false;
        }
        *self.used.entry(template_id.to_string()).or_insert(0) += 1;
        true
    }

    pub fn release(&mut self, template_id: &str) {
        let Some(count) = self.used.get_mut(template_id) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.used.remove(template_id);
        }
    }

    pub fn reset(&mut self) {
        self.used.clear();
    }

    pub fn total_used(&self) -> u32 {
        self.used.values().sum()
    }

    pub fn is_within_quotas(&self, mode: &WeekMode) -> bool {
        self.used.iter().all(|(template_id, count)| {
            mode.template(template_id)
                .map(|template| *count <= template.session_quota)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::default_week_modes;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn event(id: &str, template_id: Option<&str>, is_external: bool) -> CalendarEvent {
        let start = DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        CalendarEvent {
            id: id.to_string(),
            title: id.to_string(),
            start,
            end: start + chrono::Duration::minutes(30),
            template_id: template_id.map(ToOwned::to_owned),
            is_external,
            remote_id: None,
        }
    }

    #[test]
    fn record_is_refused_when_quota_is_used_up() {
        let mut ledger = SessionLedger::new();
        assert!(ledger.record("reading", 2));
        assert!(ledger.record("reading", 2));
        assert!(!ledger.record("reading", 2));
        assert_eq!(ledger.used("reading"), 2);
        assert_eq!(ledger.remaining("reading", 2), 0);
    }

    #[test]
    fn release_is_floored_at_zero() {
        let mut ledger = SessionLedger::new();
        ledger.release("reading");
        assert_eq!(ledger.used("reading"), 0);
        assert!(ledger.record("reading", 3));
        ledger.release("reading");
        ledger.release("reading");
        assert_eq!(ledger.used("reading"), 0);
    }

    #[test]
    fn from_events_counts_only_local_sessions() {
        let events = vec![
            event("a", Some("reading"), false),
            event("b", Some("reading"), false),
            event("c", Some("exercise"), false),
            event("d", None, true),
            event("e", Some("reading"), true),
        ];
        let ledger = SessionLedger::from_events(&events);
        assert_eq!(ledger.used("reading"), 2);
        assert_eq!(ledger.used("exercise"), 1);
        assert_eq!(ledger.total_used(), 3);
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut ledger = SessionLedger::new();
        ledger.record("reading", 6);
        let json = serde_json::to_string(&ledger).expect("serialize ledger");
        assert_eq!(json, r#"{"reading":1}"#);
        let parsed: SessionLedger = serde_json::from_str(&json).expect("deserialize ledger");
        assert_eq!(parsed, ledger);
    }

    #[test]
    fn quota_check_flags_unknown_templates() {
        let mode = default_week_modes().remove(0);
        let mut ledger = SessionLedger::new();
        ledger.record("reading", 6);
        assert!(ledger.is_within_quotas(&mode));
        ledger.record("unknown", 1);
        assert!(!ledger.is_within_quotas(&mode));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Record(usize),
        Release(usize),
        Reset,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0usize..3).prop_map(Op::Record),
            3 => (0usize..3).prop_map(Op::Release),
            1 => Just(Op::Reset),
        ]
    }

    proptest! {
        #[test]
        fn counts_stay_within_zero_and_quota(
            quotas in prop::collection::vec(1u32..8, 3),
            ops in prop::collection::vec(op_strategy(), 0..80)
        ) {
            let ids = ["reading", "exercise", "writing"];
            let mut ledger = SessionLedger::new();
            for op in ops {
                match op {
                    Op::Record(index) => {
                        let before = ledger.used(ids[index]);
                        let accepted = ledger.record(ids[index], quotas[index]);
                        if accepted {
                            prop_assert_eq!(ledger.used(ids[index]), before + 1);
                        } else {
                            prop_assert_eq!(ledger.used(ids[index]), before);
                        }
                    }
                    Op::Release(index) => {
                        let before = ledger.used(ids[index]);
                        ledger.release(ids[index]);
                        prop_assert_eq!(ledger.used(ids[index]), before.saturating_sub(1));
                    }
                    Op::Reset => ledger.reset(),
                }
                for (index, id) in ids.iter().enumerate() {
                    prop_assert!(ledger.used(id) <= quotas[index]);
                }
            }
        }
    }
}
