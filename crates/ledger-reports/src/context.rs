//! Recent-history context for model prompts.

use ledger_core::Ledger;
use serde::{Deserialize, Serialize};

/// Returned when a participant has no history yet.
pub const NO_HISTORY: &str = "No previous labels recorded in this session.";

/// One line of call-wide context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub participant: String,
    pub label: String,
    /// Generated description stored with the event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Describe a participant's recent labels, bounded by `context_limit`.
pub fn generation_context(ledger: &Ledger, session_group: &str, participant: &str) -> String {
    let labels = ledger.recent_labels(session_group, participant, ledger.config().context_limit);
    if labels.is_empty() {
        return NO_HISTORY.to_string();
    }
    format!("Recent labels in this session: {}", labels.join(", "))
}

/// The last `window_size` events across every participant of a group.
pub fn group_context(ledger: &Ledger, session_group: &str) -> Vec<ContextEntry> {
    ledger
        .events(session_group, None, ledger.config().window_size)
        .into_iter()
        .map(|event| ContextEntry {
            text: event.payload_str("text").map(str::to_string),
            participant: event.participant,
            label: event.dominant_label,
        })
        .collect()
}
