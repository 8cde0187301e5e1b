//! Label frequency and transition scans over a chronological event window.
//!
//! These are pure functions: the [`Ledger`](crate::Ledger) snapshots a window
//! under its read lock and hands the slice here.

use crate::types::{Event, LabelShare, Summary, Transition};
use std::collections::HashMap;

/// Number of labels kept in a [`Summary`].
pub const SUMMARY_TOP_LABELS: usize = 3;

/// Rank every label in `events` by count, descending.
///
/// Ties go to the label seen most recently in the window, so the order is
/// fully determined by the input.
pub fn rank_labels(events: &[Event]) -> Vec<LabelShare> {
    let total = events.len();

    // label -> (count, index of last occurrence)
    let mut tallies: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, event) in events.iter().enumerate() {
        let tally = tallies
            .entry(event.dominant_label.as_str())
            .or_insert((0, idx));
        tally.0 += 1;
        tally.1 = idx;
    }

    let mut sorted: Vec<(&str, (usize, usize))> = tallies.into_iter().collect();
    sorted.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| b.1 .1.cmp(&a.1 .1)));

    sorted
        .into_iter()
        .map(|(label, (count, _))| LabelShare {
            label: label.to_string(),
            count,
            percentage: percent(count, total),
        })
        .collect()
}

/// `count / total` as a whole percentage, rounded half up.
pub fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((count * 200 + total) / (2 * total)) as u32
}

/// Summarize a window, or `None` when it holds fewer than `min_events`.
pub fn summarize_window(events: &[Event], min_events: usize) -> Option<Summary> {
    if events.len() < min_events {
        return None;
    }

    let mut ranked = rank_labels(events);
    ranked.truncate(SUMMARY_TOP_LABELS);

    let text = ranked
        .iter()
        .map(|share| format!("{} ({}%)", share.label, share.percentage))
        .collect::<Vec<_>>()
        .join(", ");

    Some(Summary {
        window: events.len(),
        ranked,
        text,
    })
}

/// Every adjacent pair whose labels differ, in order.
pub fn detect_transitions(events: &[Event]) -> Vec<Transition> {
    events
        .windows(2)
        .filter(|pair| pair[0].dominant_label != pair[1].dominant_label)
        .map(|pair| Transition {
            from: pair[0].dominant_label.clone(),
            to: pair[1].dominant_label.clone(),
            at_sequence: pair[1].sequence,
        })
        .collect()
}
