use anyhow::Result;
use bincal::config::{AppConfig, DriverMode, load_config_file, parse_address_queries};
use bincal::model::AddressQuery;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn address_list_parses_from_json() {
    let addresses = parse_address_queries(
        r#"[
            {"name": "Home", "postcode": "BL9 0RS", "house": "70"},
            {"name": "Parents", "postcode": "BL9 9HS", "house": "108"}
        ]"#,
    );

    assert_eq!(
        addresses,
        vec![
            AddressQuery::new("Home", "BL9 0RS", "70"),
            AddressQuery::new("Parents", "BL9 9HS", "108"),
        ]
    );
}

#[test]
fn malformed_json_degrades_to_no_addresses() {
    assert!(parse_address_queries("[{\"name\": ").is_empty());
    assert!(parse_address_queries("not json").is_empty());
    assert!(parse_address_queries(r#"{"name": "Home"}"#).is_empty());
}

#[test]
fn invalid_entries_are_dropped() {
    let addresses = parse_address_queries(
        r#"[
            {"name": "Home", "postcode": "BL9 0RS", "house": "70"},
            {"name": "Blank", "postcode": "  ", "house": "1"}
        ]"#,
    );
    assert_eq!(addresses, vec![AddressQuery::new("Home", "BL9 0RS", "70")]);
}

#[test]
fn environment_list_replaces_file_addresses() {
    let mut config = AppConfig {
        addresses: vec![AddressQuery::new("File", "BL9 0RS", "1")],
        ..AppConfig::default()
    };

    config.apply_address_override(None);
    assert_eq!(config.addresses.len(), 1);

    config.apply_address_override(Some(r#"[{"name": "Env", "postcode": "BL9 9HS", "house": "2"}]"#));
    assert_eq!(config.addresses, vec![AddressQuery::new("Env", "BL9 9HS", "2")]);

    config.apply_address_override(Some("garbage"));
    assert!(config.addresses.is_empty());
}

#[test]
fn defaults_cover_the_council_site() {
    let config = AppConfig::default();
    assert_eq!(config.site.mode, DriverMode::Http);
    assert!(config.site.base_url.starts_with("https://www.bury.gov.uk/"));
    assert_eq!(config.site.timeout_secs, 10);
    assert_eq!(config.site.selectors.date_marker, ".bin__date");
    assert_eq!(config.site.selectors.address_button, ".address__listButton");
    assert_eq!(config.run.pause_secs, 30);
    assert!(config.addresses.is_empty());
}

#[test]
fn config_file_loads_with_overrides() -> Result<()> {
    let file = write_config(
        r#"
[site]
mode = "file"
pages_dir = "saved"
timeout_secs = 5

[site.selectors]
date_marker = ".collection-date"

[run]
out_dir = "calendars"
pause_secs = 0

[[address]]
name = "Home"
postcode = "BL9 0RS"
house = "70"
"#,
    )?;

    let config = load_config_file(file.path())?;

    assert_eq!(config.site.mode, DriverMode::File);
    assert_eq!(config.site.pages_dir, Some(PathBuf::from("saved")));
    assert_eq!(config.site.timeout_secs, 5);
    assert_eq!(config.site.selectors.date_marker, ".collection-date");
    assert_eq!(config.site.selectors.postcode_input, "#postcode");
    assert_eq!(config.run.out_dir, PathBuf::from("calendars"));
    assert_eq!(config.run.pause_secs, 0);
    assert_eq!(config.addresses, vec![AddressQuery::new("Home", "BL9 0RS", "70")]);
    Ok(())
}

#[test]
fn file_mode_without_pages_dir_is_rejected() -> Result<()> {
    let file = write_config("[site]\nmode = \"file\"\n")?;
    assert!(load_config_file(file.path()).is_err());
    Ok(())
}

#[test]
fn invalid_toml_is_an_error() -> Result<()> {
    let file = write_config("[[address]]\nname = \n")?;
    assert!(load_config_file(file.path()).is_err());
    Ok(())
}
