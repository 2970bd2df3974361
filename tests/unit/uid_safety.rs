use icaldav::client::{build_event_url, sanitize_uid};

#[test]
fn typical_uid_passes_through_unchanged() {
    assert_eq!(sanitize_uid("event-123@calendar.example.com").unwrap(), "event-123@calendar.example.com");
}

#[test]
fn hostile_uid_cannot_escape_the_calendar_collection() {
    let err = build_event_url("/calendars/me/work/", "../../etc/passwd").unwrap_err();
    assert!(format!("{err}").contains(".."));
}

#[test]
fn built_url_is_rooted_under_the_calendar_href() {
    let url = build_event_url("/calendars/me/work", "birthday-2026@x.com").unwrap();
    assert_eq!(url, "/calendars/me/work/birthday-2026@x.com.ics");
}
