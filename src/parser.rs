use crate::model::{CategoryTag, CollectionEvent, RawTextBlock};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const DEFAULT_LABEL: &str = "Bin Collection";

const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(st|nd|rd|th)").expect("ordinal regex must be valid"));

/// Strips ordinal suffixes from every number in `value`: "21st" becomes "21".
pub fn normalize_ordinals(value: &str) -> String {
    ORDINAL_RE.replace_all(value, "$1").into_owned()
}

/// Parses "<weekday> <day> <month> <year>", e.g. "Monday 21 April 2025".
///
/// Weekday and month must be full names in any case; abbreviations are
/// rejected. The weekday is not checked against the date. Ordinals must
/// already be stripped.
pub fn parse_collection_date(value: &str) -> Option<NaiveDate> {
    let mut tokens = value.split_whitespace();
    let (weekday, day, month, year) = (
        tokens.next()?,
        tokens.next()?,
        tokens.next()?,
        tokens.next()?,
    );
    if tokens.next().is_some() {
        return None;
    }
    if !is_full_name(&WEEKDAY_NAMES, weekday) || !is_full_name(&MONTH_NAMES, month) {
        return None;
    }

    NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %B %Y").ok()
}

fn is_full_name(names: &[&str], token: &str) -> bool {
    names.iter().any(|name| name.eq_ignore_ascii_case(token))
}

/// Classifies a label by substring, in priority order grey, blue, brown, green.
pub fn classify_label(label: &str) -> CategoryTag {
    let label = label.to_lowercase();
    [
        ("grey", CategoryTag::Grey),
        ("blue", CategoryTag::Blue),
        ("brown", CategoryTag::Brown),
        ("green", CategoryTag::Green),
    ]
    .into_iter()
    .find(|(needle, _)| label.contains(needle))
    .map(|(_, tag)| tag)
    .unwrap_or(CategoryTag::Unknown)
}

/// Turns one block into an event; `None` when it has no parseable date line.
pub fn event_from_block(block: &RawTextBlock) -> Option<CollectionEvent> {
    let label = block
        .lines()
        .find(|line| line.to_lowercase().contains("bin"))
        .map(str::trim)
        .unwrap_or(DEFAULT_LABEL);

    let Some(date_text) = block
        .lines()
        .find(|line| line.chars().any(|c| c.is_ascii_digit()))
        .map(str::trim)
    else {
        debug!(label, "block has no date line; skipping");
        return None;
    };

    let normalized = normalize_ordinals(date_text);
    let Some(date) = parse_collection_date(&normalized) else {
        debug!(label, date_text, "unparseable collection date; skipping block");
        return None;
    };

    debug!(label, %date, "collection found");
    Some(CollectionEvent {
        label: label.to_string(),
        date,
    })
}

/// Collects events from scraped blocks in encounter order, dropping blocks
/// that yield no valid date.
pub fn collect_events(blocks: &[RawTextBlock]) -> Vec<CollectionEvent> {
    blocks.iter().filter_map(event_from_block).collect()
}
