use crate::config::AppConfig;
use crate::ics::write_collection_calendar;
use crate::model::{AddressQuery, QueryFailure, QueryReport, RunReport, ScrapeOutcome};
use crate::parser::collect_events;
use crate::session::SessionDriver;
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub out_dir: PathBuf,
    /// Delay between consecutive addresses.
    pub pause: Duration,
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            out_dir: config.run.out_dir.clone(),
            pause: Duration::from_secs(config.run.pause_secs),
            dry_run: false,
        }
    }
}

/// Owns the session for one run and closes it exactly once, on every exit path.
struct SessionGuard<D: SessionDriver> {
    driver: D,
    released: bool,
}

impl<D: SessionDriver> SessionGuard<D> {
    fn new(driver: D) -> Self {
        Self {
            driver,
            released: false,
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.driver.close()
    }
}

impl<D: SessionDriver> Drop for SessionGuard<D> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(err) = self.driver.close() {
                warn!(error = %err, "failed to close session");
            }
        }
    }
}

/// Processes every address in order, isolating failures per address.
///
/// Only a failure to release the session is returned as an error.
pub fn run_queries<D: SessionDriver>(
    queries: &[AddressQuery],
    driver: D,
    options: &RunOptions,
) -> Result<RunReport> {
    let mut session = SessionGuard::new(driver);
    let mut report = RunReport::default();

    if queries.is_empty() {
        warn!("no addresses configured; nothing to do");
    }

    for (index, query) in queries.iter().enumerate() {
        if index > 0 && !options.pause.is_zero() {
            info!(
                secs = options.pause.as_secs_f64(),
                "pausing before next address"
            );
            std::thread::sleep(options.pause);
        }

        let query_report = process_query(&mut session.driver, query, options);
        info!(
            address = %query_report.name,
            blocks = query_report.blocks,
            events = query_report.events,
            written = query_report.output.is_some(),
            failure = %query_report.failure.as_ref().map(|f| f.to_string()).unwrap_or_default(),
            "address summary"
        );
        report.queries.push(query_report);
    }

    session.release()?;
    Ok(report)
}

pub fn process_query<D: SessionDriver + ?Sized>(
    driver: &mut D,
    query: &AddressQuery,
    options: &RunOptions,
) -> QueryReport {
    let mut report = QueryReport {
        name: query.name.clone(),
        ..QueryReport::default()
    };

    info!(address = %query.name, postcode = %query.postcode, "lookup start");
    let blocks = match driver.scrape(query) {
        ScrapeOutcome::Blocks(blocks) => blocks,
        ScrapeOutcome::AddressNotFound => {
            warn!(address = %query.name, house = %query.house, "address not found");
            report.failure = Some(QueryFailure::AddressNotFound);
            return report;
        }
        ScrapeOutcome::Failed { reason } => {
            warn!(address = %query.name, %reason, "lookup failed");
            report.failure = Some(QueryFailure::Session(reason));
            return report;
        }
    };

    report.blocks = blocks.len();
    let events = collect_events(&blocks);
    report.events = events.len();

    if events.is_empty() {
        info!(address = %query.name, blocks = report.blocks, "no collections found; no calendar written");
        return report;
    }

    if options.dry_run {
        info!(address = %query.name, events = events.len(), "dry run; calendar not written");
        return report;
    }

    let path = calendar_path(&options.out_dir, query);
    match write_collection_calendar(&query.name, &events, &path) {
        Ok(()) => {
            info!(address = %query.name, events = events.len(), file = %path.display(), "calendar written");
            report.output = Some(path);
        }
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(address = %query.name, file = %path.display(), %reason, "calendar not written");
            report.failure = Some(QueryFailure::Output(reason));
        }
    }

    report
}

pub fn calendar_path(out_dir: &Path, query: &AddressQuery) -> PathBuf {
    out_dir.join(format!("{}.ics", query.name))
}

pub fn validate_addresses(config: &AppConfig) -> Result<Vec<String>> {
    config.validate()?;
    if config.addresses.is_empty() {
        bail!("no addresses configured");
    }
    Ok(config
        .addresses
        .iter()
        .map(|address| {
            format!(
                "OK: {} ({} / {})",
                address.name, address.postcode, address.house
            )
        })
        .collect())
}
