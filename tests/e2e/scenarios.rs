use hyper::Method;
use icaldav::client::CalDavClient;
use icaldav::config::ClientConfig;
use icaldav::dav::model::EventWithMetadata;
use icaldav::ical::model::ICalEvent;
use icaldav::quirks::Quirks;
use icaldav::sync::{CalendarSyncState, ChangeEvent, ConflictStrategy, Op, SyncObserver, SyncWindow, push, pull};
use icaldav::transport::CancelToken;

use crate::fake_transport::{FakeTransport, ScriptedResponse};

fn client(quirks: Quirks, scripts: Vec<ScriptedResponse>) -> CalDavClient<FakeTransport> {
    CalDavClient::with_transport(
        "https://caldav.example.com",
        FakeTransport::new(scripts),
        quirks,
        ClientConfig::default(),
    )
    .expect("valid base url")
}

#[derive(Default)]
struct RecordingObserver {
    events: Vec<ChangeEvent>,
}

impl SyncObserver for RecordingObserver {
    fn on_change(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }
}

fn minimal_event(uid: &str) -> ICalEvent {
    use chrono::TimeZone;
    use icaldav::ical::model::*;
    let dtstart = chrono::Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap();
    ICalEvent {
        uid: uid.to_string(),
        import_id: uid.to_string(),
        summary: Some("Test event".to_string()),
        description: None,
        location: None,
        dtstart: ICalDateTime::utc(dtstart),
        end: Some(EventEnd::DtEnd(ICalDateTime::utc(dtstart + chrono::Duration::hours(1)))),
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

/// Scenario: `412` on `update_event` surfaces the conflict verbatim and
/// mutates no client-held state — the caller keeps the op queued itself.
#[tokio::test]
async fn update_with_stale_etag_returns_412_without_mutating_state() {
    let scripts = vec![ScriptedResponse::new(Method::PUT, "/event-a.ics", 412, "")];
    let c = client(Quirks::standard(), scripts);
    let cancel = CancelToken::new();

    let event = minimal_event("event-a@x");
    let result = c
        .update_event("/cal/event-a.ics", &event, Some("stale-etag"), &cancel)
        .await;

    match result {
        Err(e) => assert!(e.is_precondition_failed()),
        Ok(_) => panic!("expected a 412 conflict"),
    }
}

/// Scenario: a sync-collection call against an invalid token returns the
/// provider's invalidation status (403 for iCloud); `pull` falls back to
/// comparing ctag, then diffing etags over the active window, and still
/// reports every server-side change exactly once.
#[tokio::test]
async fn sync_token_invalidation_falls_back_to_ctag_etag_diff() {
    let scripts = vec![
        ScriptedResponse::new(
            Method::OPTIONS,
            "/cal/",
            200,
            "",
        )
        .with_header("dav", "1, 2, 3, calendar-access")
        .with_header("allow", "OPTIONS, GET, PROPFIND, REPORT"),
        ScriptedResponse::new(
            Method::from_bytes(b"REPORT").unwrap(),
            "/cal/",
            403,
            "",
        ),
        ScriptedResponse::new(
            Method::from_bytes(b"PROPFIND").unwrap(),
            "/cal/",
            207,
            r#"<D:multistatus xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
                <D:response><D:href>/cal/</D:href>
                <D:propstat><D:prop><CS:getctag>new-ctag</CS:getctag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
                </D:response></D:multistatus>"#,
        ),
    ];
    // The etags-only calendar-query and the multiget both REPORT against
    // the same href, so both must be scripted on the same queue entry;
    // FakeTransport consumes the REPORT script above for the
    // sync-collection attempt, leaving these two for the fallback path.
    let mut scripts = scripts;
    scripts.push(ScriptedResponse::new(
        Method::from_bytes(b"REPORT").unwrap(),
        "/cal/",
        207,
        r#"<D:multistatus xmlns:D="DAV:">
            <D:response><D:href>/cal/changed.ics</D:href>
            <D:propstat><D:prop><D:getetag>"etag-2"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
            </D:response>
            <D:response><D:href>/cal/unchanged.ics</D:href>
            <D:propstat><D:prop><D:getetag>"etag-1"</D:getetag></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
            </D:response>
        </D:multistatus>"#,
    ));
    scripts.push(ScriptedResponse::new(
        Method::from_bytes(b"REPORT").unwrap(),
        "/cal/",
        207,
        r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
            <D:response><D:href>/cal/changed.ics</D:href>
            <D:propstat><D:prop>
                <D:getetag>"etag-2"</D:getetag>
                <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:changed@x
DTSTAMP:20260601T000000Z
DTSTART:20260601T090000Z
SUMMARY:Changed
END:VEVENT
END:VCALENDAR
</C:calendar-data>
            </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
            </D:response>
        </D:multistatus>"#,
    ));

    let c = client(Quirks::icloud(), scripts);
    let cancel = CancelToken::new();

    let mut state = CalendarSyncState::default();
    state.sync_token = Some("old-token".to_string());
    state.ctag = Some("old-ctag".to_string());
    state
        .local_etag_map
        .insert("/cal/changed.ics".to_string(), "etag-1".to_string());
    state
        .local_etag_map
        .insert("/cal/unchanged.ics".to_string(), "etag-1".to_string());

    let mut observer = RecordingObserver::default();
    let window = SyncWindow {
        start: chrono::Utc::now() - chrono::Duration::days(30),
        end: chrono::Utc::now() + chrono::Duration::days(365),
    };

    pull(&c, "/cal/", &mut state, window, &mut observer, &cancel)
        .await
        .expect("pull recovers via the ctag fallback");

    assert_eq!(state.sync_token, None, "the invalid token was cleared");
    assert_eq!(state.ctag.as_deref(), Some("new-ctag"));
    assert_eq!(observer.events.len(), 1, "only the truly changed resource is reported");
    match &observer.events[0] {
        ChangeEvent::Modified(meta) => assert_eq!(meta.href, "/cal/changed.ics"),
        other => panic!("expected Modified, got {other:?}"),
    }
}

/// Scenario: a multistatus body declaring a DOCTYPE with an external entity
/// must parse with the entity left unexpanded — `fetch_events` never
/// surfaces file contents even when the server response tries to smuggle
/// them in.
#[tokio::test]
async fn xxe_payload_never_leaks_entity_contents() {
    let malicious = r#"<?xml version="1.0"?><!DOCTYPE foo [<!ENTITY x SYSTEM "file:///etc/passwd">]><D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav"><D:response><D:href>&x;</D:href><D:propstat><D:prop><C:calendar-data>BEGIN:VCALENDAR
END:VCALENDAR
</C:calendar-data></D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>"#;

    let scripts = vec![ScriptedResponse::new(
        Method::from_bytes(b"REPORT").unwrap(),
        "/cal/",
        207,
        malicious,
    )];
    let c = client(Quirks::standard(), scripts);
    let cancel = CancelToken::new();

    let events = c
        .fetch_events("/cal/", None, None, &cancel)
        .await
        .expect("the xxe attempt does not abort parsing");

    assert_eq!(events.len(), 1);
    assert!(!events[0].href.contains("root:"), "entity expansion must not leak /etc/passwd");
}

/// Scenario: `local-wins` on a `412` refetches the server's current etag
/// and resubmits the queued `Update` against it — the local change must
/// actually reach the server, not just get reported as a resolved conflict.
#[tokio::test]
async fn local_wins_conflict_resubmits_update_with_fresh_etag() {
    let scripts = vec![
        ScriptedResponse::new(Method::PUT, "/cal/event-a.ics", 412, ""),
        ScriptedResponse::new(
            Method::from_bytes(b"REPORT").unwrap(),
            "/cal/",
            207,
            r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
                <D:response><D:href>/cal/event-a.ics</D:href>
                <D:propstat><D:prop>
                    <D:getetag>"remote-v2"</D:getetag>
                    <C:calendar-data>BEGIN:VCALENDAR
BEGIN:VEVENT
UID:event-a@x
DTSTAMP:20260601T000000Z
DTSTART:20260601T090000Z
SUMMARY:Server copy
END:VEVENT
END:VCALENDAR
</C:calendar-data>
                </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
                </D:response></D:multistatus>"#,
        ),
        ScriptedResponse::new(Method::PUT, "/cal/event-a.ics", 200, "").with_header("etag", "\"v3\""),
    ];
    let c = client(Quirks::standard(), scripts);
    let cancel = CancelToken::new();

    let local_raw = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//EN\r\nBEGIN:VEVENT\r\nUID:event-a@x\r\nDTSTAMP:20260601T000000Z\r\nDTSTART:20260601T090000Z\r\nSUMMARY:Local edit\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    let mut state = CalendarSyncState::default();
    state
        .local_etag_map
        .insert("/cal/event-a.ics".to_string(), "stale-etag".to_string());
    state.queue(Op::Update {
        href: "/cal/event-a.ics".to_string(),
        raw_ical: local_raw.to_string(),
        base_etag: Some("stale-etag".to_string()),
    });

    let report = push(&c, "/cal/", &mut state, ConflictStrategy::LocalWins, &cancel)
        .await
        .expect("push resolves the conflict by resubmitting");

    assert_eq!(report.applied, 1, "the resubmitted PUT must count as applied");
    assert!(report.conflicts.is_empty(), "local-wins must not leave an unresolved conflict behind");
    assert_eq!(
        state.local_etag_map.get("/cal/event-a.ics").map(String::as_str),
        Some("v3"),
        "the etag from the successful resubmission must be recorded"
    );
}

/// Baseline smoke test: `create_event` with `If-None-Match: *` succeeds and
/// returns the server-assigned etag.
#[tokio::test]
async fn create_event_succeeds_and_returns_etag() {
    let scripts = vec![
        ScriptedResponse::new(Method::PUT, "/new-event@x.ics", 201, "").with_header("etag", "\"v1\""),
    ];
    let c = client(Quirks::standard(), scripts);
    let cancel = CancelToken::new();

    let event = minimal_event("new-event@x");
    let meta: EventWithMetadata = c
        .create_event("/cal", &event, &cancel)
        .await
        .expect("creation succeeds");

    assert_eq!(meta.etag.as_deref(), Some("v1"));
    assert!(meta.href.ends_with("new-event@x.ics"));
}
