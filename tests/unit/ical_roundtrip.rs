use chrono::TimeZone;
use icaldav::ical::generator::generate_calendar;
use icaldav::ical::model::*;
use icaldav::ical::parser::parse_calendar_stream;

fn sample_event() -> ICalEvent {
    let dtstart = chrono::Utc.with_ymd_and_hms(2026, 3, 10, 14, 30, 0).unwrap();
    ICalEvent {
        uid: "roundtrip-1@example.com".to_string(),
        import_id: "roundtrip-1@example.com".to_string(),
        summary: Some("Quarterly review".to_string()),
        description: Some("Line one\nLine two, with a comma; and a semicolon".to_string()),
        location: None,
        dtstart: ICalDateTime::utc(dtstart),
        end: Some(EventEnd::DtEnd(ICalDateTime::utc(dtstart + chrono::Duration::hours(1)))),
        is_all_day: false,
        status: Some(EventStatus::Confirmed),
        classification: Some(Classification::Private),
        transparency: Transparency::Opaque,
        sequence: 2,
        rrule: None,
        rdates: Vec::new(),
        exdates: Vec::new(),
        recurrence_id: None,
        alarms: Vec::new(),
        categories: vec!["WORK".to_string(), "FINANCE".to_string()],
        organizer: None,
        attendees: Vec::new(),
        color: None,
        dtstamp: None,
        last_modified: None,
        created: None,
        url: None,
        raw_properties: vec![
            RawProperty {
                name: "X-CUSTOM-FIELD".to_string(),
                params: vec![("X-PRIORITY".to_string(), vec!["high".to_string()])],
                value: "keep-me".to_string(),
            },
            RawProperty {
                name: "X-CUSTOM-FIELD".to_string(),
                params: Vec::new(),
                value: "keep-me-too".to_string(),
            },
        ],
    }
}

fn wrap(event: ICalEvent) -> ICalCalendar {
    ICalCalendar {
        prod_id: "-//icaldav//EN".to_string(),
        version: "2.0".to_string(),
        events: vec![event],
        todos: Vec::new(),
        journals: Vec::new(),
        timezones: Default::default(),
    }
}

#[test]
fn event_survives_generate_then_parse() {
    let calendar = wrap(sample_event());
    let wire = generate_calendar(&calendar);

    assert!(wire.lines().all(|l| l.as_bytes().len() <= 75 || l.starts_with(' ')));

    let (parsed, warnings) = parse_calendar_stream(&wire).expect("valid calendar");
    assert!(warnings.failed_components.is_empty());
    assert_eq!(parsed.events.len(), 1);

    let round_tripped = &parsed.events[0];
    assert_eq!(round_tripped.uid, "roundtrip-1@example.com");
    assert_eq!(round_tripped.summary.as_deref(), Some("Quarterly review"));
    assert_eq!(
        round_tripped.description.as_deref(),
        Some("Line one\nLine two, with a comma; and a semicolon")
    );
    assert_eq!(round_tripped.classification, Some(Classification::Private));
    assert_eq!(round_tripped.status, Some(EventStatus::Confirmed));
    assert_eq!(round_tripped.categories, vec!["WORK".to_string(), "FINANCE".to_string()]);
    assert_eq!(round_tripped.raw_properties.len(), 2, "repeated unknown properties must not collapse");
    assert_eq!(round_tripped.raw_properties[0].name, "X-CUSTOM-FIELD");
    assert_eq!(round_tripped.raw_properties[0].value, "keep-me");
    assert_eq!(
        round_tripped.raw_properties[0].params,
        vec![("X-PRIORITY".to_string(), vec!["high".to_string()])],
        "parameters on an unknown property must survive round-trip"
    );
    assert_eq!(round_tripped.raw_properties[1].value, "keep-me-too");
}

#[test]
fn long_summary_is_folded_and_recovered_intact() {
    let mut event = sample_event();
    event.summary = Some("x".repeat(200));
    let wire = generate_calendar(&wrap(event));

    let has_folded_continuation = wire.lines().any(|l| l.starts_with(' '));
    assert!(has_folded_continuation, "a 200-octet SUMMARY line must fold");

    let (parsed, _) = parse_calendar_stream(&wire).expect("valid calendar");
    assert_eq!(parsed.events[0].summary, Some("x".repeat(200)));
}

#[test]
fn unparsable_component_does_not_abort_the_whole_stream() {
    let raw = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//icaldav//EN\r\n\
BEGIN:VEVENT\r\n\
UID:good@example.com\r\n\
DTSTART:20260310T143000Z\r\n\
SUMMARY:Fine\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:missing-dtstart@example.com\r\n\
SUMMARY:No start time\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    let (parsed, warnings) = parse_calendar_stream(raw).expect("stream still parses");
    assert_eq!(parsed.events.len(), 1, "the broken VEVENT is dropped, not the whole stream");
    assert_eq!(parsed.events[0].uid, "good@example.com");
    assert_eq!(warnings.failed_components.len(), 1);
    assert_eq!(warnings.failed_components[0].component, "VEVENT");
}
