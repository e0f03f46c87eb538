use anyhow::Result;
use bincal::ics::{PROVENANCE, event_title, render_collection_calendar, write_collection_calendar};
use bincal::model::CollectionEvent;
use chrono::NaiveDate;
use ical::IcalParser;
use ical::parser::ical::component::IcalEvent;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tempfile::tempdir;

fn event(label: &str, y: i32, m: u32, d: u32) -> CollectionEvent {
    CollectionEvent {
        label: label.to_string(),
        date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
    }
}

fn property<'a>(event: &'a IcalEvent, name: &str) -> Option<&'a ical::property::Property> {
    event.properties.iter().find(|p| p.name == name)
}

fn read_events(path: &Path) -> Vec<IcalEvent> {
    let reader = BufReader::new(File::open(path).unwrap());
    let calendar = IcalParser::new(reader)
        .next()
        .expect("file holds a calendar")
        .expect("calendar parses");
    calendar.events
}

#[test]
fn titles_carry_the_category_marker() {
    assert_eq!(event_title(&event("Grey Bin", 2025, 4, 21)), "\u{2b1b} Grey Bin");
    assert_eq!(event_title(&event("Blue Bin", 2025, 4, 21)), "\u{1f7e6} Blue Bin");
    assert_eq!(
        event_title(&event("Food waste", 2025, 4, 21)),
        "\u{1f5d1}\u{fe0f} Food waste"
    );
}

#[test]
fn written_calendar_reads_back_as_all_day_entries() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("Home.ics");
    let events = vec![
        event("Grey Bin", 2025, 4, 21),
        event("Blue Bin", 2025, 4, 29),
        event("Brown Bin", 2025, 12, 31),
    ];

    write_collection_calendar("Home", &events, &path)?;
    let parsed = read_events(&path);

    assert_eq!(parsed.len(), events.len());
    for (expected, entry) in events.iter().zip(&parsed) {
        let summary = property(entry, "SUMMARY").and_then(|p| p.value.clone());
        assert_eq!(summary, Some(event_title(expected)));

        let start = property(entry, "DTSTART").expect("DTSTART present");
        assert_eq!(
            start.value.as_deref(),
            Some(expected.date.format("%Y%m%d").to_string().as_str())
        );
        let params = start.params.clone().unwrap_or_default();
        assert!(
            params
                .iter()
                .any(|(k, v)| k == "VALUE" && v.iter().any(|x| x == "DATE"))
        );

        let end = property(entry, "DTEND").and_then(|p| p.value.clone());
        let next_day = expected.date.succ_opt().unwrap().format("%Y%m%d").to_string();
        assert_eq!(end, Some(next_day));

        let description = property(entry, "DESCRIPTION").and_then(|p| p.value.clone());
        assert_eq!(description.as_deref(), Some(PROVENANCE));
    }

    Ok(())
}

#[test]
fn output_is_crlf_utf8_with_stable_uids() -> Result<()> {
    let events = vec![event("Green Bin", 2025, 5, 6)];

    let first = render_collection_calendar("Home", &events);
    let second = render_collection_calendar("Home", &events);
    let other = render_collection_calendar("Elsewhere", &events);

    assert!(first.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
    assert!(first.ends_with("END:VCALENDAR\r\n"));
    assert!(first.contains("SUMMARY:\u{1f7e9} Green Bin\r\n"));
    assert!(first.contains("CATEGORIES:GREEN\r\n"));

    let uid = |text: &str| {
        text.lines()
            .find(|line| line.starts_with("UID:"))
            .map(str::to_string)
    };
    assert_eq!(uid(&first), uid(&second));
    assert_ne!(uid(&first), uid(&other));

    Ok(())
}

#[test]
fn repeated_collections_keep_distinct_uids() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("Home.ics");
    let events = vec![
        event("Grey Bin", 2025, 4, 21),
        event("Grey Bin", 2025, 4, 21),
        event("Blue Bin", 2025, 4, 21),
    ];

    write_collection_calendar("Home", &events, &path)?;
    let parsed = read_events(&path);
    assert_eq!(parsed.len(), 3);

    let uids: Vec<String> = parsed
        .iter()
        .filter_map(|entry| property(entry, "UID").and_then(|p| p.value.clone()))
        .collect();
    assert_eq!(uids.len(), 3);
    assert_ne!(uids[0], uids[1]);
    assert_ne!(uids[0], uids[2]);
    assert_ne!(uids[1], uids[2]);

    let single = render_collection_calendar("Home", &events[..1]);
    assert!(single.contains(&format!("UID:{}\r\n", uids[0])));

    Ok(())
}

#[test]
fn long_lines_are_folded_within_75_octets() {
    let label = "Grey Bin ".repeat(20);
    let text = render_collection_calendar("Home", &[event(label.trim(), 2025, 4, 21)]);

    for line in text.split("\r\n") {
        assert!(line.len() <= 75, "line too long: {line:?}");
    }
    let unfolded = text.replace("\r\n ", "");
    assert!(unfolded.contains(&format!("SUMMARY:\u{2b1b} {}", label.trim())));
}

#[test]
fn existing_file_is_overwritten() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("Home.ics");
    fs::write(&path, "stale")?;

    write_collection_calendar("Home", &[event("Grey Bin", 2025, 4, 21)], &path)?;

    let content = fs::read_to_string(&path)?;
    assert!(content.starts_with("BEGIN:VCALENDAR"));
    assert!(!content.contains("stale"));
    Ok(())
}

#[test]
fn unwritable_target_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, "file")?;

    let result = write_collection_calendar(
        "Home",
        &[event("Grey Bin", 2025, 4, 21)],
        &blocker.join("Home.ics"),
    );

    assert!(result.is_err());
    Ok(())
}
