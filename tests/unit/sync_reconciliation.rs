use chrono::TimeZone;
use icaldav::dav::model::EventWithMetadata;
use icaldav::sync::{CalendarSyncState, ConflictStrategy, Op, Resolution, coalesce, resolve};

#[test]
fn queuing_an_edit_then_a_delete_leaves_only_the_delete() {
    let mut state = CalendarSyncState::default();
    state.queue(Op::Update {
        href: "/cal/event-1.ics".to_string(),
        raw_ical: "updated body".to_string(),
        base_etag: Some("etag-1".to_string()),
    });
    state.queue(Op::Delete {
        href: "/cal/event-1.ics".to_string(),
        base_etag: None,
    });

    let coalesced = coalesce(state.pending_ops.drain(..).collect());
    assert_eq!(
        coalesced,
        vec![Op::Delete {
            href: "/cal/event-1.ics".to_string(),
            base_etag: Some("etag-1".to_string()),
        }]
    );
}

#[test]
fn newest_wins_strategy_keeps_the_later_local_edit() {
    let local = EventWithMetadata {
        href: "/cal/event-2.ics".to_string(),
        etag: Some("local-etag".to_string()),
        raw_ical: None,
    };
    let remote = EventWithMetadata {
        href: "/cal/event-2.ics".to_string(),
        etag: Some("remote-etag".to_string()),
        raw_ical: None,
    };
    let local_modified = chrono::Utc.with_ymd_and_hms(2026, 6, 2, 0, 0, 0).unwrap();
    let remote_modified = chrono::Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

    let resolution = resolve(
        ConflictStrategy::NewestWins,
        local,
        remote,
        Some(local_modified),
        Some(remote_modified),
    );

    match resolution {
        Resolution::ResubmitWithEtag(etag) => assert_eq!(etag, "remote-etag"),
        other => panic!("expected a resubmit, got {other:?}"),
    }
}

#[test]
fn manual_strategy_keeps_the_op_available_for_a_later_retry() {
    let mut state = CalendarSyncState::default();
    state.queue(Op::Update {
        href: "/cal/event-3.ics".to_string(),
        raw_ical: "local body".to_string(),
        base_etag: Some("stale-etag".to_string()),
    });

    let local = EventWithMetadata {
        href: "/cal/event-3.ics".to_string(),
        etag: Some("stale-etag".to_string()),
        raw_ical: Some("local body".to_string()),
    };
    let remote = EventWithMetadata {
        href: "/cal/event-3.ics".to_string(),
        etag: Some("fresh-etag".to_string()),
        raw_ical: Some("remote body".to_string()),
    };

    let resolution = resolve(ConflictStrategy::Manual, local, remote, None, None);
    assert!(matches!(resolution, Resolution::NeedsManualResolution { .. }));
}

#[test]
fn sync_state_survives_a_json_round_trip() {
    let mut state = CalendarSyncState::default();
    state.sync_token = Some("opaque-token".to_string());
    state.ctag = Some("\"ctag-7\"".to_string());
    state.local_etag_map.insert("/cal/a.ics".to_string(), "etag-a".to_string());
    state.queue(Op::Create {
        uid: "new-event@x".to_string(),
        raw_ical: "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n".to_string(),
    });

    let json = serde_json::to_string(&state).expect("serializable");
    let restored: CalendarSyncState = serde_json::from_str(&json).expect("deserializable");

    assert_eq!(restored.sync_token, state.sync_token);
    assert_eq!(restored.ctag, state.ctag);
    assert_eq!(restored.local_etag_map, state.local_etag_map);
    assert_eq!(restored.pending_ops, state.pending_ops);
}
