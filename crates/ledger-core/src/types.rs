use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-owned fields stored verbatim alongside an event.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Payload key holding the wall-clock time an event was recorded (RFC 3339).
pub const TIMESTAMP_KEY: &str = "timestamp";

/// One detection result for one participant at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub session_group: String,
    pub participant: String,
    pub dominant_label: String,
    #[serde(default)]
    pub payload: Payload,
    /// Insertion index, monotonic across the whole session group.
    pub sequence: u64,
}

impl Event {
    /// Display timestamp from the payload, if present and parsable.
    ///
    /// Accepts RFC 3339 and offset-less ISO 8601, the latter read as UTC.
    /// Never used for ordering unless a caller asks for [`MergeOrder::WallClock`].
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.payload
            .get(TIMESTAMP_KEY)
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp)
    }

    /// A string payload field, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Ordering used when merging events from several participants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOrder {
    /// Group-wide insertion order.
    #[default]
    Sequence,
    /// Payload wall-clock timestamp, falling back to sequence.
    WallClock,
}

/// A label with its count and rounded share of a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelShare {
    pub label: String,
    pub count: usize,
    /// Share of the window in whole percent, rounded half up.
    pub percentage: u32,
}

/// Frequency summary of the most recent events of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Number of events the summary was computed over.
    pub window: usize,
    /// Top labels, most frequent first.
    pub ranked: Vec<LabelShare>,
    /// Human-readable form, e.g. `sad (58%), happy (42%)`.
    pub text: String,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A change of dominant label between two adjacent events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: String,
    pub to: String,
    /// Sequence of the event that carried the new label.
    pub at_sequence: u64,
}

/// Point-in-time size of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub session_groups: usize,
    pub buckets: usize,
    pub events: usize,
}
