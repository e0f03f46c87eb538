use anyhow::Result;
use bincal::config::{ADDRESSES_ENV, load_config};
use bincal::pipeline::{RunOptions, run_queries, validate_addresses};
use bincal::session::open_session;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bincal", about = "Bin collection dates to ICS calendars")]
struct Cli {
    /// Configuration file; `bincal.toml` is used when present.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Seconds to wait between addresses.
    #[arg(long)]
    pause_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run {
        /// Only process the address with this name.
        #[arg(long)]
        address: Option<String>,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    Validate,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    let env_addresses = std::env::var(ADDRESSES_ENV).ok();
    config.apply_address_override(env_addresses.as_deref());
    if let Some(out_dir) = cli.out_dir {
        config.run.out_dir = out_dir;
    }
    if let Some(pause_secs) = cli.pause_secs {
        config.run.pause_secs = pause_secs;
    }

    match cli.command {
        Commands::Run { address, dry_run } => {
            let mut queries = config.addresses.clone();
            if let Some(filter) = &address {
                queries.retain(|q| q.name == *filter);
                if queries.is_empty() {
                    warn!(address = %filter, "no configured address has this name");
                }
            }

            let options = RunOptions {
                dry_run,
                ..RunOptions::from_config(&config)
            };
            let session = open_session(&config.site)?;
            let report = run_queries(&queries, session, &options)?;

            info!(
                addresses = report.queries.len(),
                files = report.files_written(),
                failures = report.failures().count(),
                "run complete"
            );
        }
        Commands::Validate => {
            for line in validate_addresses(&config)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}
