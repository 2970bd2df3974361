use chrono::TimeZone;
use icaldav::config::RecurrenceConfig;
use icaldav::ical::model::*;
use icaldav::recurrence::{TimeRange, build_override_map, expand};
use std::collections::HashMap;

fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> Instant {
    chrono::Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
}

fn base_event(uid: &str, dtstart: Instant) -> ICalEvent {
    ICalEvent {
        uid: uid.to_string(),
        import_id: uid.to_string(),
        summary: Some("Standup".to_string()),
        description: None,
        location: None,
        dtstart: ICalDateTime::utc(dtstart),
        end: Some(EventEnd::DtEnd(ICalDateTime::utc(dtstart + chrono::Duration::minutes(30)))),
        is_all_day: false,
        status: None,
        classification: None,
        transparency: Transparency::Opaque,
        sequence: 0,
        rrule: None,
        rdates: Vec::new(),
        exdates: Vec::new(),
        recurrence_id: None,
        alarms: Vec::new(),
        categories: Vec::new(),
        organizer: None,
        attendees: Vec::new(),
        color: None,
        dtstamp: None,
        last_modified: None,
        created: None,
        url: None,
        raw_properties: Default::default(),
    }
}

/// `build_override_map` feeding straight into `expand` — the two functions
/// are always used together by a calendar client reconciling a server's
/// master event plus its `RECURRENCE-ID` overrides fetched in one REPORT.
#[test]
fn override_fetched_alongside_master_replaces_the_generated_occurrence() {
    let master_start = utc(2026, 4, 6, 9, 0);
    let mut master = base_event("standup@team", master_start);
    master.rrule = Some(RRule {
        freq: Frequency::Daily,
        count: Some(5),
        ..Default::default()
    });

    let mut moved = base_event("standup@team", utc(2026, 4, 8, 11, 0));
    moved.summary = Some("Standup (moved to late morning)".to_string());
    moved.recurrence_id = Some(ICalDateTime::utc(utc(2026, 4, 8, 9, 0)));
    moved.import_id = ICalEvent::compute_import_id("standup@team", moved.recurrence_id.as_ref());

    let fetched = vec![master.clone(), moved.clone()];
    let overrides = build_override_map(&fetched);
    assert_eq!(overrides.len(), 1);

    let range = TimeRange {
        start: utc(2026, 4, 1, 0, 0),
        end: utc(2026, 5, 1, 0, 0),
    };
    let config = RecurrenceConfig::default();
    let occurrences = expand(&master, range, &overrides, &config);

    assert_eq!(occurrences.len(), 5);
    let replaced = occurrences
        .iter()
        .find(|o| o.dtstart.day_code() == "20260408")
        .expect("the overridden day is still present");
    assert_eq!(replaced.summary.as_deref(), Some("Standup (moved to late morning)"));
    assert_eq!(replaced.dtstart.timestamp, utc(2026, 4, 8, 11, 0));
}

#[test]
fn build_override_map_ignores_non_override_events() {
    let master = base_event("standup@team", utc(2026, 1, 1, 9, 0));
    let map = build_override_map(&[master]);
    assert!(map.is_empty());
}

/// Yearly `BYMONTHDAY=29` starting on a leap day only ever produces
/// occurrences in leap years — non-leap Februaries have no 29th.
#[test]
fn yearly_byday_29_only_recurs_on_leap_years() {
    let mut event = base_event("anniversary@x", utc(2024, 2, 29, 8, 0));
    event.rrule = Some(RRule {
        freq: Frequency::Yearly,
        by_month: vec![2],
        by_monthday: vec![29],
        count: None,
        ..Default::default()
    });

    let range = TimeRange {
        start: utc(2024, 1, 1, 0, 0),
        end: utc(2032, 1, 1, 0, 0),
    };
    let config = RecurrenceConfig::default();
    let occurrences = expand(&event, range, &HashMap::new(), &config);

    let years: Vec<i32> = occurrences.iter().map(|o| o.dtstart.timestamp.format("%Y").to_string().parse().unwrap()).collect();
    assert_eq!(years, vec![2024, 2028]);
}
