use crate::model::CollectionEvent;
use crate::parser::classify_label;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Timelike, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

pub const PROVENANCE: &str = "Generated by bincal.";

/// Entry title: the category marker followed by the label.
pub fn event_title(event: &CollectionEvent) -> String {
    format!("{} {}", classify_label(&event.label).marker(), event.label)
}

pub fn render_collection_calendar(calendar_name: &str, events: &[CollectionEvent]) -> String {
    let stamp = Utc::now();
    let mut lines = Vec::new();
    push_line(&mut lines, "BEGIN:VCALENDAR".to_string());
    push_line(&mut lines, "VERSION:2.0".to_string());
    push_line(
        &mut lines,
        "PRODID:-//bincal//Bin Collection Calendar 1.0//EN".to_string(),
    );
    push_line(&mut lines, "CALSCALE:GREGORIAN".to_string());
    push_line(&mut lines, "METHOD:PUBLISH".to_string());
    push_line(
        &mut lines,
        format!(
            "X-WR-CALNAME:{} bin collections",
            escape_text(calendar_name)
        ),
    );

    // Repeats of the same label and date get their own UID.
    let mut seen: HashMap<(String, NaiveDate), usize> = HashMap::new();
    for event in events {
        let occurrence = seen
            .entry((event.label.to_lowercase(), event.date))
            .or_default();
        append_event_lines(&mut lines, calendar_name, event, *occurrence, stamp);
        *occurrence += 1;
    }

    push_line(&mut lines, "END:VCALENDAR".to_string());
    lines.join("\r\n") + "\r\n"
}

/// Writes one all-day entry per event to `path`, replacing any existing file.
pub fn write_collection_calendar(
    calendar_name: &str,
    events: &[CollectionEvent],
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output dir {}", parent.display()))?;
    }

    std::fs::write(path, render_collection_calendar(calendar_name, events))
        .with_context(|| format!("failed to write ics {}", path.display()))?;

    Ok(())
}

fn append_event_lines(
    lines: &mut Vec<String>,
    calendar_name: &str,
    event: &CollectionEvent,
    occurrence: usize,
    stamp: chrono::DateTime<Utc>,
) {
    let tag = classify_label(&event.label);

    push_line(lines, "BEGIN:VEVENT".to_string());
    push_line(lines, format!("UID:{}", stable_uid(calendar_name, event, occurrence)));
    push_line(lines, format!("DTSTAMP:{}", format_utc(stamp)));
    push_line(
        lines,
        format!("DTSTART;VALUE=DATE:{}", format_date(event.date)),
    );
    let exclusive_end = event.date.succ_opt().unwrap_or(event.date);
    push_line(
        lines,
        format!("DTEND;VALUE=DATE:{}", format_date(exclusive_end)),
    );
    push_line(lines, format!("SUMMARY:{}", escape_text(&event_title(event))));
    push_line(lines, format!("DESCRIPTION:{}", escape_text(PROVENANCE)));
    push_line(lines, format!("CATEGORIES:{}", tag.as_str().to_ascii_uppercase()));
    push_line(lines, "TRANSP:TRANSPARENT".to_string());
    push_line(lines, "END:VEVENT".to_string());
}

fn stable_uid(calendar_name: &str, event: &CollectionEvent, occurrence: usize) -> String {
    let mut identity = format!(
        "{}::{}::{}",
        calendar_name,
        event.label.to_lowercase(),
        event.date
    );
    if occurrence > 0 {
        identity.push_str(&format!("::{occurrence}"));
    }
    let digest = Sha256::digest(identity.as_bytes());
    let short = &hex::encode(digest)[..24];
    format!("{short}@bincal.local")
}

fn push_line(lines: &mut Vec<String>, line: String) {
    lines.extend(fold_line(&line));
}

// Continuation lines carry a leading space, so they hold one octet less.
fn fold_line(line: &str) -> Vec<String> {
    const LIMIT: usize = 75;

    if line.len() <= LIMIT {
        return vec![line.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for ch in line.chars() {
        let limit = if chunks.is_empty() { LIMIT } else { LIMIT - 1 };
        if current.len() + ch.len_utf8() > limit {
            chunks.push(current.clone());
            current.clear();
        }
        current.push(ch);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| if i == 0 { chunk } else { format!(" {chunk}") })
        .collect()
}

fn format_utc(value: chrono::DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        value.year(),
        value.month(),
        value.day(),
        value.hour(),
        value.minute(),
        value.second()
    )
}

fn format_date(value: NaiveDate) -> String {
    format!("{:04}{:02}{:02}", value.year(), value.month(), value.day())
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
