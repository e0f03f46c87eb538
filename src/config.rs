use crate::model::AddressQuery;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ADDRESSES_ENV: &str = "BINCAL_ADDRESSES";
pub const DEFAULT_CONFIG_FILE: &str = "bincal.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default, rename = "address")]
    pub addresses: Vec<AddressQuery>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.site.base_url.trim().is_empty() {
            bail!("site.base_url must not be empty");
        }
        if self.site.mode == DriverMode::File && self.site.pages_dir.is_none() {
            bail!("site.pages_dir is required for file mode");
        }
        for address in &self.addresses {
            address.validate()?;
        }
        warn_duplicate_identities(&self.addresses);
        Ok(())
    }

    /// Replaces the file's address list with the environment's, when one is given.
    pub fn apply_address_override(&mut self, env_value: Option<&str>) {
        if let Some(raw) = env_value {
            self.addresses = parse_address_queries(raw);
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    #[default]
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub mode: DriverMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Saved result pages, one `<address name>.html` per address.
    #[serde(default)]
    pub pages_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_consent_timeout_secs")]
    pub consent_timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            mode: DriverMode::Http,
            base_url: default_base_url(),
            pages_dir: None,
            timeout_secs: default_timeout_secs(),
            consent_timeout_secs: default_consent_timeout_secs(),
            user_agent: None,
            selectors: SelectorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_postcode_input")]
    pub postcode_input: String,
    #[serde(default = "default_submit")]
    pub submit: String,
    #[serde(default = "default_address_button")]
    pub address_button: String,
    #[serde(default = "default_date_marker")]
    pub date_marker: String,
    #[serde(default = "default_consent_button")]
    pub consent_button: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            postcode_input: default_postcode_input(),
            submit: default_submit(),
            address_button: default_address_button(),
            date_marker: default_date_marker(),
            consent_button: default_consent_button(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            pause_secs: default_pause_secs(),
        }
    }
}

pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config: AppConfig = toml::from_str(&text)
        .with_context(|| format!("failed to parse toml in {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Loads `path`, or `bincal.toml` when present, or the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return load_config_file(path);
    }
    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return load_config_file(default_path);
    }
    Ok(AppConfig::default())
}

/// Parses a JSON array of address queries.
///
/// Malformed input yields an empty list and invalid entries are dropped; both
/// are reported as warnings rather than errors.
pub fn parse_address_queries(raw: &str) -> Vec<AddressQuery> {
    let parsed: Vec<AddressQuery> = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "address list is not valid json; continuing with no addresses");
            return Vec::new();
        }
    };

    let addresses: Vec<AddressQuery> = parsed
        .into_iter()
        .filter(|address| match address.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "dropping invalid address");
                false
            }
        })
        .collect();
    warn_duplicate_identities(&addresses);
    addresses
}

fn warn_duplicate_identities(addresses: &[AddressQuery]) {
    let mut seen = HashSet::new();
    for address in addresses {
        if !seen.insert(address.identity()) {
            warn!(
                address = %address.name,
                postcode = %address.postcode,
                house = %address.house,
                "address is configured more than once"
            );
        }
    }
}

fn default_base_url() -> String {
    "https://www.bury.gov.uk/waste-and-recycling/bin-collection-days-and-alerts".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_consent_timeout_secs() -> u64 {
    3
}

fn default_postcode_input() -> String {
    "#postcode".to_string()
}

fn default_submit() -> String {
    "div.form-buttons button[type='submit']".to_string()
}

fn default_address_button() -> String {
    ".address__listButton".to_string()
}

fn default_date_marker() -> String {
    ".bin__date".to_string()
}

fn default_consent_button() -> String {
    "button".to_string()
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_pause_secs() -> u64 {
    30
}
