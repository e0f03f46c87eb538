use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One configured address to look up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    /// Display name, used verbatim as the output file stem.
    pub name: String,
    pub postcode: String,
    /// House number or name, matched as a substring of the address text.
    pub house: String,
}

impl AddressQuery {
    pub fn new(name: &str, postcode: &str, house: &str) -> Self {
        Self {
            name: name.to_string(),
            postcode: postcode.to_string(),
            house: house.to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("address name must not be empty");
        }
        if self.postcode.trim().is_empty() {
            bail!("address {} has an empty postcode", self.name);
        }
        if self.house.trim().is_empty() {
            bail!("address {} has an empty house identifier", self.name);
        }
        Ok(())
    }

    /// Identity of the lookup, independent of the display name.
    pub fn identity(&self) -> (String, String) {
        (
            self.postcode.trim().to_ascii_uppercase(),
            self.house.trim().to_lowercase(),
        )
    }
}

/// Scraped text believed to describe one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTextBlock {
    pub text: String,
}

impl RawTextBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn from_lines(lines: &[&str]) -> Self {
        Self::new(lines.join("\n"))
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEvent {
    pub label: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryTag {
    Grey,
    Blue,
    Brown,
    Green,
    Unknown,
}

impl CategoryTag {
    pub fn marker(&self) -> &'static str {
        match self {
            CategoryTag::Grey => "\u{2b1b}",
            CategoryTag::Blue => "\u{1f7e6}",
            CategoryTag::Brown => "\u{1f7eb}",
            CategoryTag::Green => "\u{1f7e9}",
            CategoryTag::Unknown => "\u{1f5d1}\u{fe0f}",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryTag::Grey => "grey",
            CategoryTag::Blue => "blue",
            CategoryTag::Brown => "brown",
            CategoryTag::Green => "green",
            CategoryTag::Unknown => "unknown",
        }
    }
}

/// What a session driver produced for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Blocks(Vec<RawTextBlock>),
    AddressNotFound,
    Failed { reason: String },
}

impl ScrapeOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ScrapeOutcome::Failed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    AddressNotFound,
    Session(String),
    Output(String),
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFailure::AddressNotFound => f.write_str("address not found"),
            QueryFailure::Session(reason) => write!(f, "session failed: {reason}"),
            QueryFailure::Output(reason) => write!(f, "output failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryReport {
    pub name: String,
    pub blocks: usize,
    pub events: usize,
    pub output: Option<PathBuf>,
    pub failure: Option<QueryFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub queries: Vec<QueryReport>,
}

impl RunReport {
    pub fn files_written(&self) -> usize {
        self.queries.iter().filter(|q| q.output.is_some()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &QueryReport> {
        self.queries.iter().filter(|q| q.failure.is_some())
    }
}
