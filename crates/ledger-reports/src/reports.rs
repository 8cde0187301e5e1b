//! Markdown report generation for a session group.

use ledger_core::aggregations::{detect_transitions, rank_labels, summarize_window};
use ledger_core::{Event, Ledger, LedgerConfig};
use std::collections::BTreeMap;

/// Report generator for creating markdown summaries.
pub struct ReportGenerator;

/// Every retained event of one group, read under a single lock.
///
/// Sections rendered from the same snapshot always agree with each other,
/// even while other tasks keep appending.
struct GroupSnapshot {
    merged: Vec<Event>,
    by_participant: BTreeMap<String, Vec<Event>>,
}

impl GroupSnapshot {
    fn take(ledger: &Ledger, session_group: &str) -> Self {
        let merged = ledger.events(session_group, None, usize::MAX);
        let mut by_participant: BTreeMap<String, Vec<Event>> = BTreeMap::new();
        for event in &merged {
            by_participant
                .entry(event.participant.clone())
                .or_default()
                .push(event.clone());
        }
        Self {
            merged,
            by_participant,
        }
    }
}

/// The last `limit` events of a chronological slice.
fn tail(events: &[Event], limit: usize) -> &[Event] {
    &events[events.len().saturating_sub(limit)..]
}

/// Escape characters that would break a markdown table cell.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

fn summary_text(config: &LedgerConfig, events: &[Event]) -> Option<String> {
    summarize_window(tail(events, config.summary_window), config.min_summary_events)
        .map(|s| s.text)
}

impl ReportGenerator {
    /// Generate a full report for one session group.
    pub fn session_report(ledger: &Ledger, session_group: &str) -> String {
        let mut report = String::new();
        report.push_str(&format!("# Session Report\n\n**{}**\n\n", session_group));

        let snapshot = GroupSnapshot::take(ledger, session_group);
        if snapshot.by_participant.is_empty() {
            report.push_str("No events recorded.\n");
            return report;
        }

        tracing::debug!(
            session_group,
            participants = snapshot.by_participant.len(),
            events = snapshot.merged.len(),
            "Rendering session report"
        );

        let config = ledger.config();
        let limit = config.distribution_limit;

        // Overview.
        report.push_str("## Overview\n\n");
        report.push_str(&format!("- **Participants:** {}\n", snapshot.by_participant.len()));
        report.push_str(&format!("- **Events retained:** {}\n", snapshot.merged.len()));

        let overall = rank_labels(tail(&snapshot.merged, limit));
        if let Some(top) = overall.first() {
            report.push_str(&format!(
                "- **Most frequent label:** {} ({}%)\n",
                top.label, top.percentage
            ));
        }
        report.push('\n');

        for (participant, events) in &snapshot.by_participant {
            report.push_str(&format!("## {}\n\n", participant));

            match summary_text(config, events) {
                Some(text) => report.push_str(&format!("- **Summary:** {}\n\n", text)),
                None => report.push_str("- **Summary:** not enough history\n\n"),
            }

            report.push_str("| Label | Count | Share |\n");
            report.push_str("|-------|-------|-------|\n");
            for share in rank_labels(tail(events, limit)) {
                report.push_str(&format!(
                    "| {} | {} | {}% |\n",
                    escape_cell(&share.label),
                    share.count,
                    share.percentage
                ));
            }
            report.push('\n');

            let transitions = detect_transitions(tail(events, config.transition_window));
            if !transitions.is_empty() {
                report.push_str("### Transitions\n\n");
                for (i, t) in transitions.iter().enumerate() {
                    report.push_str(&format!(
                        "{}. `{}` -> `{}` at #{}\n",
                        i + 1,
                        t.from,
                        t.to,
                        t.at_sequence
                    ));
                }
                report.push('\n');
            }
        }

        report
    }

    /// One line per participant, for terminal output.
    pub fn text_summary(ledger: &Ledger, session_group: &str) -> String {
        let config = ledger.config();
        let snapshot = GroupSnapshot::take(ledger, session_group);

        let mut output = String::new();
        for (participant, events) in &snapshot.by_participant {
            let summary = summary_text(config, events)
                .unwrap_or_else(|| "not enough history".to_string());
            let transitions = detect_transitions(tail(events, config.transition_window)).len();
            output.push_str(&format!(
                "  {}: {} ({})\n",
                participant,
                summary,
                plural(transitions, "transition", "transitions")
            ));
        }
        if output.is_empty() {
            output.push_str("  no activity\n");
        }
        output
    }
}
