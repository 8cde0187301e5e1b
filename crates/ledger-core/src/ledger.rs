//! Bounded, multi-key session memory.
//!
//! Events are grouped by session group, then by participant. Each
//! (group, participant) bucket keeps at most `retention_cap` events and drops
//! the oldest first. Buckets are only created by [`Ledger::append`]; every read
//! path treats a missing key as empty.

use crate::aggregations::{detect_transitions, rank_labels, summarize_window};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::types::{Event, LabelShare, LedgerStats, MergeOrder, Payload, Summary, Transition, TIMESTAMP_KEY};
use chrono::{SecondsFormat, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// All buckets of one session group plus its sequence counter.
#[derive(Debug, Default)]
struct SessionGroup {
    /// Shared by every participant so events order across buckets.
    next_sequence: u64,
    buckets: HashMap<String, VecDeque<Event>>,
}

impl SessionGroup {
    fn event_count(&self) -> usize {
        self.buckets.values().map(VecDeque::len).sum()
    }
}

/// Process-wide event store. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    retention_cap: usize,
    groups: RwLock<HashMap<String, SessionGroup>>,
}

impl Ledger {
    /// Create an empty ledger. Fails if the config has a zero-sized window.
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retention_cap: config.retention_cap(),
            config,
            groups: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn retention_cap(&self) -> usize {
        self.retention_cap
    }

    /// Record an event and return the sequence number assigned to it.
    ///
    /// The wall-clock time is written to `payload["timestamp"]` unless the
    /// caller already set it. Once the bucket exceeds the retention cap the
    /// oldest events are dropped.
    pub fn append(
        &self,
        session_group: &str,
        participant: &str,
        dominant_label: &str,
        mut payload: Payload,
    ) -> Result<u64> {
        require("session group", session_group)?;
        require("participant", participant)?;
        require("dominant label", dominant_label)?;

        payload.entry(TIMESTAMP_KEY).or_insert_with(|| {
            serde_json::Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        });

        let mut groups = self.write();
        let group = groups.entry(session_group.to_string()).or_default();
        let sequence = group.next_sequence;
        group.next_sequence += 1;

        let bucket = group.buckets.entry(participant.to_string()).or_default();
        bucket.push_back(Event {
            session_group: session_group.to_string(),
            participant: participant.to_string(),
            dominant_label: dominant_label.to_string(),
            payload,
            sequence,
        });

        let mut evicted = 0usize;
        while bucket.len() > self.retention_cap {
            bucket.pop_front();
            evicted += 1;
        }

        tracing::debug!(
            session_group,
            participant,
            sequence,
            label = dominant_label,
            evicted,
            "Appended event"
        );
        Ok(sequence)
    }

    /// Labels of the most recent `limit` events, oldest first.
    pub fn recent_labels(&self, session_group: &str, participant: &str, limit: usize) -> Vec<String> {
        let groups = self.read();
        bucket(&groups, session_group, participant)
            .map(|b| tail(b, limit).map(|e| e.dominant_label.clone()).collect())
            .unwrap_or_default()
    }

    /// Up to `limit` most recent events in chronological order.
    ///
    /// With no participant, every bucket in the group is merged in sequence order.
    pub fn events(&self, session_group: &str, participant: Option<&str>, limit: usize) -> Vec<Event> {
        self.events_ordered(session_group, participant, limit, MergeOrder::Sequence)
    }

    /// Like [`Ledger::events`], choosing how a cross-participant merge is ordered.
    ///
    /// `order` has no effect for a single participant, whose bucket is
    /// already in insertion order.
    pub fn events_ordered(
        &self,
        session_group: &str,
        participant: Option<&str>,
        limit: usize,
        order: MergeOrder,
    ) -> Vec<Event> {
        let groups = self.read();
        let Some(group) = groups.get(session_group) else {
            return Vec::new();
        };

        match participant {
            Some(participant) => group
                .buckets
                .get(participant)
                .map(|b| tail(b, limit).cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut merged: Vec<&Event> = group.buckets.values().flatten().collect();
                merged.sort_by_key(|e| e.sequence);
                if order == MergeOrder::WallClock {
                    merged = by_wall_clock(merged);
                }
                let start = merged.len().saturating_sub(limit);
                merged[start..].iter().map(|e| (*e).clone()).collect()
            }
        }
    }

    /// Top labels over the summary window, or `None` with too little history.
    pub fn summarize(&self, session_group: &str, participant: &str) -> Option<Summary> {
        let window = self.events(session_group, Some(participant), self.config.summary_window);
        summarize_window(&window, self.config.min_summary_events)
    }

    /// Label changes between adjacent events in the transition window.
    pub fn transitions(&self, session_group: &str, participant: &str) -> Vec<Transition> {
        let window = self.events(session_group, Some(participant), self.config.transition_window);
        detect_transitions(&window)
    }

    /// Every label over the last `limit` events, ranked like a summary but untruncated.
    pub fn distribution(
        &self,
        session_group: &str,
        participant: Option<&str>,
        limit: usize,
    ) -> Vec<LabelShare> {
        rank_labels(&self.events(session_group, participant, limit))
    }

    /// Participant ids with history in the group, sorted.
    pub fn participants(&self, session_group: &str) -> Vec<String> {
        let groups = self.read();
        let mut ids: Vec<String> = groups
            .get(session_group)
            .map(|g| g.buckets.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop every bucket under the group. Clearing an unknown group is a no-op.
    pub fn clear_session_group(&self, session_group: &str) {
        let removed = self.write().remove(session_group);
        match removed {
            Some(group) => tracing::info!(
                session_group,
                participants = group.buckets.len(),
                events = group.event_count(),
                "Cleared session group"
            ),
            None => tracing::debug!(session_group, "Clear requested for unknown session group"),
        }
    }

    pub fn stats(&self) -> LedgerStats {
        let groups = self.read();
        LedgerStats {
            session_groups: groups.len(),
            buckets: groups.values().map(|g| g.buckets.len()).sum(),
            events: groups.values().map(SessionGroup::event_count).sum(),
        }
    }

    // A panic can only happen before a bucket is touched, so a poisoned
    // guard still holds consistent data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionGroup>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionGroup>> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        let config = LedgerConfig::default();
        Self {
            retention_cap: config.retention_cap(),
            config,
            groups: RwLock::new(HashMap::new()),
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn bucket<'a>(
    groups: &'a HashMap<String, SessionGroup>,
    session_group: &str,
    participant: &str,
) -> Option<&'a VecDeque<Event>> {
    groups.get(session_group)?.buckets.get(participant)
}

/// Reorder sequence-sorted events by payload timestamp.
///
/// An event without a parsable timestamp inherits the last one seen before it
/// in sequence order, so it stays where its sequence places it.
fn by_wall_clock(events: Vec<&Event>) -> Vec<&Event> {
    let mut last_seen = None;
    let mut keyed: Vec<_> = events
        .into_iter()
        .map(|event| {
            if let Some(at) = event.recorded_at() {
                last_seen = Some(at);
            }
            (last_seen, event)
        })
        .collect();
    keyed.sort_by_key(|(at, event)| (*at, event.sequence));
    keyed.into_iter().map(|(_, event)| event).collect()
}

/// The last `limit` events of a bucket, oldest first.
fn tail(bucket: &VecDeque<Event>, limit: usize) -> impl Iterator<Item = &Event> {
    let start = bucket.len().saturating_sub(limit);
    bucket.iter().skip(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn append_all(ledger: &Ledger, group: &str, participant: &str, labels: &[&str]) {
        for label in labels {
            ledger.append(group, participant, label, Payload::new()).unwrap();
        }
    }

    fn ledger_with_cap(cap: usize) -> Ledger {
        Ledger::new(LedgerConfig {
            retention_cap: Some(cap),
            ..LedgerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = Ledger::new(LedgerConfig {
            summary_window: 0,
            ..LedgerConfig::default()
        })
        .unwrap_err();
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_append_assigns_increasing_sequence() {
        let ledger = Ledger::default();
        assert_eq!(ledger.append("call1", "alice", "happy", Payload::new()).unwrap(), 0);
        assert_eq!(ledger.append("call1", "alice", "sad", Payload::new()).unwrap(), 1);
        assert_eq!(ledger.append("call2", "alice", "sad", Payload::new()).unwrap(), 0);

        let events = ledger.events("call1", Some("alice"), 10);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(events[1].dominant_label, "sad");
        assert_eq!(events[1].participant, "alice");
    }

    #[test]
    fn test_append_rejects_blank_fields() {
        let ledger = Ledger::default();
        for (group, participant, label) in [("", "alice", "happy"), ("call1", "", "happy"), ("call1", "alice", ""), ("call1", "alice", "  ")] {
            let err = ledger.append(group, participant, label, Payload::new()).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidArgument(_)));
        }
        assert_eq!(ledger.stats(), LedgerStats::default());
    }

    #[test]
    fn test_payload_kept_verbatim_with_timestamp() {
        let ledger = Ledger::default();
        ledger
            .append("call1", "alice", "happy", payload(json!({"confidence": 0.8, "text": "smiling"})))
            .unwrap();
        ledger
            .append("call1", "alice", "sad", payload(json!({"timestamp": "2024-01-01T00:00:00Z"})))
            .unwrap();

        let events = ledger.events("call1", Some("alice"), 10);
        assert_eq!(events[0].payload["confidence"], 0.8);
        assert_eq!(events[0].payload_str("text"), Some("smiling"));
        assert!(events[0].recorded_at().is_some());
        assert_eq!(events[1].payload_str("timestamp"), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_retention_cap_evicts_oldest() {
        let ledger = ledger_with_cap(5);
        for i in 0..12 {
            ledger
                .append("call1", "alice", &format!("label-{}", i), Payload::new())
                .unwrap();
            let events = ledger.events("call1", Some("alice"), usize::MAX);
            assert!(events.len() <= 5);
        }

        let events = ledger.events("call1", Some("alice"), 100);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![7, 8, 9, 10, 11]);
        assert_eq!(ledger.stats().events, 5);
    }

    #[test]
    fn test_default_cap_is_twice_window() {
        let ledger = Ledger::default();
        append_all(&ledger, "call1", "alice", &["calm"; 30]);
        assert_eq!(ledger.retention_cap(), 20);
        assert_eq!(ledger.events("call1", Some("alice"), 100).len(), 20);
    }

    #[test]
    fn test_recent_labels_match_events() {
        let ledger = Ledger::default();
        append_all(&ledger, "call1", "alice", &["a", "b", "c", "d", "e", "f"]);

        for n in [0, 1, 3, 6, 10] {
            let labels = ledger.recent_labels("call1", "alice", n);
            assert!(labels.len() <= n);
            let from_events: Vec<String> = ledger
                .events("call1", Some("alice"), n)
                .into_iter()
                .map(|e| e.dominant_label)
                .collect();
            assert_eq!(labels, from_events);
        }
        assert_eq!(ledger.recent_labels("call1", "alice", 3), vec!["d", "e", "f"]);
    }

    #[test]
    fn test_unknown_keys_read_empty_without_allocating() {
        let ledger = Ledger::default();
        assert!(ledger.recent_labels("nope", "alice", 5).is_empty());
        assert!(ledger.events("nope", None, 5).is_empty());
        assert!(ledger.events("nope", Some("alice"), 5).is_empty());
        assert!(ledger.summarize("nope", "alice").is_none());
        assert!(ledger.transitions("nope", "alice").is_empty());
        assert!(ledger.distribution("nope", None, 50).is_empty());
        assert!(ledger.participants("nope").is_empty());

        ledger.append("call1", "alice", "happy", Payload::new()).unwrap();
        assert!(ledger.events("call1", Some("typo"), 5).is_empty());
        assert_eq!(
            ledger.stats(),
            LedgerStats {
                session_groups: 1,
                buckets: 1,
                events: 1
            }
        );
    }

    #[test]
    fn test_merged_events_follow_group_sequence() {
        let ledger = Ledger::default();
        ledger.append("call1", "alice", "happy", Payload::new()).unwrap();
        ledger.append("call1", "bob", "calm", Payload::new()).unwrap();
        ledger.append("call1", "alice", "sad", Payload::new()).unwrap();
        ledger.append("call1", "bob", "tense", Payload::new()).unwrap();

        let merged = ledger.events("call1", None, 10);
        let order: Vec<(&str, u64)> = merged
            .iter()
            .map(|e| (e.participant.as_str(), e.sequence))
            .collect();
        assert_eq!(order, vec![("alice", 0), ("bob", 1), ("alice", 2), ("bob", 3)]);

        let latest = ledger.events("call1", None, 2);
        assert_eq!(latest[0].dominant_label, "sad");
        assert_eq!(latest[1].dominant_label, "tense");
    }

    #[test]
    fn test_wall_clock_merge_is_opt_in() {
        let ledger = Ledger::default();
        ledger
            .append("call1", "alice", "late", payload(json!({"timestamp": "2024-01-01T00:00:05Z"})))
            .unwrap();
        ledger
            .append("call1", "bob", "early", payload(json!({"timestamp": "2024-01-01T00:00:01Z"})))
            .unwrap();

        let by_sequence = ledger.events("call1", None, 10);
        assert_eq!(by_sequence[0].dominant_label, "late");

        let by_clock = ledger.events_ordered("call1", None, 10, MergeOrder::WallClock);
        assert_eq!(by_clock[0].dominant_label, "early");
        assert_eq!(by_clock[1].dominant_label, "late");
    }

    #[test]
    fn test_wall_clock_merge_keeps_unparsable_stamps_in_place() {
        let ledger = Ledger::default();
        ledger
            .append("call1", "alice", "first", payload(json!({"timestamp": "2024-01-01T00:00:01Z"})))
            .unwrap();
        ledger
            .append("call1", "bob", "newest", payload(json!({"timestamp": "not a time"})))
            .unwrap();

        let latest = ledger.events_ordered("call1", None, 1, MergeOrder::WallClock);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].dominant_label, "newest");

        let all = ledger.events_ordered("call1", None, 10, MergeOrder::WallClock);
        let labels: Vec<&str> = all.iter().map(|e| e.dominant_label.as_str()).collect();
        assert_eq!(labels, vec!["first", "newest"]);
    }

    #[test]
    fn test_wall_clock_merge_reads_naive_iso_stamps() {
        let ledger = Ledger::default();
        ledger
            .append("call1", "alice", "zoned", payload(json!({"timestamp": "2024-01-01T00:00:05Z"})))
            .unwrap();
        ledger
            .append("call1", "bob", "naive-late", payload(json!({"timestamp": "2024-01-01T00:00:09.123456"})))
            .unwrap();
        ledger
            .append("call1", "carol", "naive-early", payload(json!({"timestamp": "2024-01-01T00:00:00.500000"})))
            .unwrap();

        let all = ledger.events_ordered("call1", None, 10, MergeOrder::WallClock);
        let labels: Vec<&str> = all.iter().map(|e| e.dominant_label.as_str()).collect();
        assert_eq!(labels, vec!["naive-early", "zoned", "naive-late"]);

        let latest = ledger.events_ordered("call1", None, 1, MergeOrder::WallClock);
        assert_eq!(latest[0].dominant_label, "naive-late");
    }

    #[test]
    fn test_summary_needs_three_events() {
        let ledger = Ledger::default();
        assert!(ledger.summarize("call1", "alice").is_none());
        ledger.append("call1", "alice", "happy", Payload::new()).unwrap();
        assert!(ledger.summarize("call1", "alice").is_none());
        ledger.append("call1", "alice", "sad", Payload::new()).unwrap();
        assert!(ledger.summarize("call1", "alice").is_none());
        ledger.append("call1", "alice", "calm", Payload::new()).unwrap();
        assert!(ledger.summarize("call1", "alice").is_some());
    }

    #[test]
    fn test_summary_scenario() {
        let ledger = ledger_with_cap(20);
        let labels: Vec<&str> = std::iter::repeat("happy")
            .take(5)
            .chain(std::iter::repeat("sad").take(7))
            .collect();

        for (i, label) in labels.iter().enumerate() {
            ledger.append("call1", "alice", label, Payload::new()).unwrap();
            assert_eq!(ledger.summarize("call1", "alice").is_some(), i >= 2);
        }

        let summary = ledger.summarize("call1", "alice").unwrap();
        assert_eq!(summary.window, 12);
        assert_eq!(summary.ranked[0].label, "sad");
        assert_eq!(summary.ranked[0].percentage, 58);
        assert_eq!(summary.ranked[1].label, "happy");
        assert_eq!(summary.ranked[1].percentage, 42);
        assert_eq!(summary.to_string(), "sad (58%), happy (42%)");
    }

    #[test]
    fn test_summary_uses_summary_window() {
        let ledger = Ledger::new(LedgerConfig {
            retention_cap: Some(30),
            summary_window: 4,
            ..LedgerConfig::default()
        })
        .unwrap();
        append_all(&ledger, "call1", "alice", &["happy", "happy", "happy", "sad", "sad", "calm", "calm"]);

        let summary = ledger.summarize("call1", "alice").unwrap();
        assert_eq!(summary.window, 4);
        assert_eq!(summary.text, "calm (50%), sad (50%)");
    }

    #[test]
    fn test_transitions() {
        let ledger = Ledger::default();
        append_all(&ledger, "call1", "alice", &["calm"; 5]);
        assert!(ledger.transitions("call1", "alice").is_empty());

        append_all(&ledger, "call1", "bob", &["calm", "tense", "calm", "tense"]);
        let transitions = ledger.transitions("call1", "bob");
        assert_eq!(transitions.len(), 3);
        assert_eq!(transitions[0].from, "calm");
        assert_eq!(transitions[0].to, "tense");
        assert_eq!(transitions[2].from, "calm");
        assert_eq!(transitions[2].to, "tense");
        // bob's events carry group-wide sequences 5..=8
        assert_eq!(transitions[0].at_sequence, 6);
    }

    #[test]
    fn test_distribution_across_participants() {
        let ledger = Ledger::default();
        append_all(&ledger, "call1", "alice", &["happy", "happy", "sad"]);
        append_all(&ledger, "call1", "bob", &["happy", "calm"]);

        let all = ledger.distribution("call1", None, 50);
        assert_eq!(all[0].label, "happy");
        assert_eq!(all[0].count, 3);
        assert_eq!(all[0].percentage, 60);
        assert_eq!(all.len(), 3);

        let bob = ledger.distribution("call1", Some("bob"), 50);
        assert_eq!(bob.len(), 2);
        assert_eq!(bob[0].label, "calm");
    }

    #[test]
    fn test_clear_session_group() {
        let ledger = Ledger::default();
        append_all(&ledger, "call1", "alice", &["happy", "sad", "calm"]);
        append_all(&ledger, "call1", "bob", &["calm"]);
        append_all(&ledger, "call2", "carol", &["calm"]);
        assert_eq!(ledger.participants("call1"), vec!["alice", "bob"]);

        ledger.clear_session_group("call1");
        assert!(ledger.events("call1", None, 10).is_empty());
        assert!(ledger.events("call1", Some("alice"), 10).is_empty());
        assert!(ledger.events("call1", Some("bob"), 10).is_empty());
        assert!(ledger.summarize("call1", "alice").is_none());
        assert!(ledger.participants("call1").is_empty());
        assert_eq!(ledger.events("call2", None, 10).len(), 1);

        ledger.clear_session_group("call1");
        ledger.clear_session_group("never-existed");

        let sequence = ledger.append("call1", "alice", "happy", Payload::new()).unwrap();
        assert_eq!(sequence, 0);
    }

    #[test]
    fn test_concurrent_appends_stay_ordered_and_bounded() {
        let ledger = Arc::new(ledger_with_cap(20));

        std::thread::scope(|scope| {
            for participant in ["alice", "bob", "carol", "dave"] {
                let ledger = Arc::clone(&ledger);
                scope.spawn(move || {
                    for i in 0..50 {
                        let label = if i % 2 == 0 { "calm" } else { "tense" };
                        ledger.append("call1", participant, label, Payload::new()).unwrap();
                        let _ = ledger.summarize("call1", participant);
                    }
                });
            }
        });

        for participant in ["alice", "bob", "carol", "dave"] {
            let events = ledger.events("call1", Some(participant), usize::MAX);
            assert_eq!(events.len(), 20);
            assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
        }
        assert_eq!(ledger.append("call1", "alice", "calm", Payload::new()).unwrap(), 200);
    }
}
