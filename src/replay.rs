//! Offline replay of recorded events into a fresh ledger.

use anyhow::{Context, Result};
use ledger_core::{Ledger, Payload};
use ledger_reports::ReportGenerator;
use serde::Deserialize;
use std::path::Path;

/// One line of a replay file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    pub session_group: String,
    pub participant: String,
    #[serde(alias = "label")]
    pub dominant_label: String,
    #[serde(default)]
    pub payload: Payload,
}

/// Parse JSON lines, skipping blank lines and `#` comments.
pub fn parse_records(contents: &str) -> Result<Vec<ReplayRecord>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid event record", idx + 1))
        })
        .collect()
}

/// Append every record, returning session groups in first-seen order.
pub fn load(ledger: &Ledger, records: Vec<ReplayRecord>) -> Result<Vec<String>> {
    let mut groups: Vec<String> = Vec::new();
    for (idx, record) in records.into_iter().enumerate() {
        ledger
            .append(
                &record.session_group,
                &record.participant,
                &record.dominant_label,
                record.payload,
            )
            .with_context(|| format!("record {}", idx + 1))?;
        if !groups.contains(&record.session_group) {
            groups.push(record.session_group);
        }
    }
    Ok(groups)
}

/// Replay `input` and render reports for `only` or every group seen.
pub fn run(ledger: &Ledger, input: &Path, only: Option<&str>, brief: bool) -> Result<String> {
    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let records = parse_records(&contents)?;
    let count = records.len();
    let groups = load(ledger, records)?;
    tracing::info!("Replayed {} events across {} session groups", count, groups.len());

    let selected: Vec<&str> = match only {
        Some(group) => vec![group],
        None => groups.iter().map(String::as_str).collect(),
    };

    let mut output = String::new();
    for group in selected {
        if brief {
            output.push_str(&format!("{}\n", group));
            output.push_str(&ReportGenerator::text_summary(ledger, group));
        } else {
            output.push_str(&ReportGenerator::session_report(ledger, group));
        }
    }
    Ok(output)
}
