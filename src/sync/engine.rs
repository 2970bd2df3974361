//! Offline-first pull/push reconciliation (§4.6): per-calendar state, the
//! pull algorithm (sync-token with a ctag+etag-diff fallback), the push
//! algorithm (coalesce, execute, resolve conflicts, dead-letter), and the
//! ordering guarantees that bind the two together.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::CalDavClient;
use crate::dav::model::EventWithMetadata;
use crate::error::{DavError, DavResult};
use crate::ical::model::{ICalEvent, Instant};
use crate::ical::parser::parse_calendar_stream;
use crate::sync::conflict::{ConflictStrategy, Resolution, resolve};
use crate::sync::queue::{Op, coalesce};
use crate::transport::{CancelToken, HttpTransport};

/// A change observed during [`pull`], dispatched to the application in the
/// order the engine observed it.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Added(EventWithMetadata),
    Modified(EventWithMetadata),
    Deleted(String),
}

/// Receives [`ChangeEvent`]s as `pull` discovers them, one calendar at a
/// time, in order.
pub trait SyncObserver {
    fn on_change(&mut self, event: ChangeEvent);
}

/// A queued op the push algorithm could not execute and will not retry
/// automatically — `HttpError{400,403,404,405,409}` per §4.6.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub op: Op,
    pub cause: DavError,
}

/// Outcome of one [`push`] call.
#[derive(Debug, Default)]
pub struct PushReport {
    pub applied: usize,
    pub conflicts: Vec<Resolution>,
    pub dead_letters: Vec<DeadLetter>,
    pub requeued: Vec<Op>,
}

/// Per-calendar sync state, persistable by the caller (§6). `local_etag_map`
/// is the etag the engine last observed for each href — it backs both the
/// Added-vs-Modified distinction in `pull` and the ctag+etag-diff fallback
/// when no sync token is held.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarSyncState {
    pub sync_token: Option<String>,
    pub ctag: Option<String>,
    pub last_full_sync_at: Option<Instant>,
    pub pending_ops: VecDeque<Op>,
    pub local_etag_map: HashMap<String, String>,
}

impl CalendarSyncState {
    /// Queue a local mutation. `Create` is rejected if an op is already
    /// queued for `uid`/`href` as a `Create` or `Update` — a caller should
    /// edit the pending op's body directly rather than double-queue; this
    /// only guards the one case `coalesce` cannot distinguish from a
    /// legitimate second edit (two `Create`s for the same uid).
    pub fn queue(&mut self, op: Op) {
        self.pending_ops.push_back(op);
    }

    fn drain_coalesced(&mut self, calendar_href: &str) -> Vec<Op> {
        let ops: Vec<Op> = self.pending_ops.drain(..).collect();
        coalesce(ops, calendar_href)
    }
}

/// Active application window for the ctag+etag-diff fallback path — the
/// range `fetch_etags_in_range` is scoped to when no sync token is held.
#[derive(Debug, Clone, Copy)]
pub struct SyncWindow {
    pub start: Instant,
    pub end: Instant,
}

/// Pull remote changes into `state`, dispatching each to `observer` in
/// order. Prefers `sync_collection` when the server supports it and a
/// token is held; falls back to a ctag comparison, and on change, an
/// etag-diff over `window` resolved via `fetch_etags_in_range` +
/// `fetch_events_by_href`.
pub async fn pull<T: HttpTransport>(
    client: &CalDavClient<T>,
    calendar_href: &str,
    state: &mut CalendarSyncState,
    window: SyncWindow,
    observer: &mut dyn SyncObserver,
    cancel: &CancelToken,
) -> DavResult<()> {
    if state.sync_token.is_some() {
        match client
            .sync_collection_if_supported(calendar_href, state.sync_token.as_deref(), cancel)
            .await
        {
            Ok(Some(mut result)) => {
                if !result.added_hrefs.is_empty() {
                    let hrefs: Vec<String> =
                        result.added_hrefs.iter().map(|e| e.href.clone()).collect();
                    let fetched = client
                        .fetch_events_by_href(calendar_href, &hrefs, cancel)
                        .await?;
                    result.added.extend(fetched);
                }

                for deleted_href in &result.deleted {
                    state.local_etag_map.remove(deleted_href);
                    observer.on_change(ChangeEvent::Deleted(deleted_href.clone()));
                }
                for event in result.added {
                    let is_new = !state.local_etag_map.contains_key(&event.href);
                    if let Some(etag) = &event.etag {
                        state.local_etag_map.insert(event.href.clone(), etag.clone());
                    }
                    observer.on_change(if is_new {
                        ChangeEvent::Added(event)
                    } else {
                        ChangeEvent::Modified(event)
                    });
                }

                state.sync_token = result.new_sync_token;
                return Ok(());
            }
            Ok(None) => {
                // Server no longer claims sync-collection support; fall
                // through to the ctag path below.
            }
            Err(DavError::Http { code, .. })
                if client.quirks().is_invalid_sync_token_status(code) =>
            {
                debug!(calendar_href, code, "sync token invalidated, falling back to ctag diff");
                state.sync_token = None;
            }
            Err(e) => return Err(e),
        }
    }

    let current_ctag = client.get_ctag(calendar_href, cancel).await?;
    if current_ctag.is_some() && current_ctag == state.ctag {
        return Ok(());
    }

    let remote_etags = client
        .fetch_etags_in_range(calendar_href, window.start, window.end, cancel)
        .await?;

    let remote_map: HashMap<&str, &str> = remote_etags
        .iter()
        .filter_map(|e| e.etag.as_deref().map(|tag| (e.href.as_str(), tag)))
        .collect();

    let deleted: Vec<String> = state
        .local_etag_map
        .keys()
        .filter(|href| !remote_map.contains_key(href.as_str()))
        .cloned()
        .collect();

    let changed_hrefs: Vec<String> = remote_etags
        .iter()
        .filter(|e| state.local_etag_map.get(&e.href).map(String::as_str) != e.etag.as_deref())
        .map(|e| e.href.clone())
        .collect();

    if !changed_hrefs.is_empty() {
        let events = client
            .fetch_events_by_href(calendar_href, &changed_hrefs, cancel)
            .await?;
        for event in events {
            let is_new = !state.local_etag_map.contains_key(&event.href);
            if let Some(etag) = &event.etag {
                state.local_etag_map.insert(event.href.clone(), etag.clone());
            }
            observer.on_change(if is_new {
                ChangeEvent::Added(event)
            } else {
                ChangeEvent::Modified(event)
            });
        }
    }

    for href in deleted {
        state.local_etag_map.remove(&href);
        observer.on_change(ChangeEvent::Deleted(href));
    }

    state.ctag = current_ctag;
    state.last_full_sync_at = Some(chrono::Utc::now());
    Ok(())
}

/// Push queued local mutations to the server. On `412` applies `strategy`;
/// on a retriable transport error the op is left queued; on the
/// non-retriable HTTP codes named in §4.6 it is dead-lettered.
pub async fn push<T: HttpTransport>(
    client: &CalDavClient<T>,
    calendar_href: &str,
    state: &mut CalendarSyncState,
    strategy: ConflictStrategy,
    cancel: &CancelToken,
) -> DavResult<PushReport> {
    let ops = state.drain_coalesced(calendar_href);
    let mut report = PushReport::default();

    for op in ops {
        match execute_one(client, calendar_href, &op, strategy, state, cancel).await {
            Ok(Outcome::Applied) => report.applied += 1,
            Ok(Outcome::Conflict(resolution)) => {
                if let Resolution::NeedsManualResolution { .. } = &resolution {
                    state.pending_ops.push_back(op);
                }
                report.conflicts.push(resolution);
            }
            Err(e) if e.is_retriable() => {
                warn!(calendar_href, error = %e, "push op left queued after retriable failure");
                report.requeued.push(op.clone());
                state.pending_ops.push_back(op);
            }
            Err(DavError::Http { code, .. }) if dead_letter_code(code) => {
                report.dead_letters.push(DeadLetter {
                    op,
                    cause: DavError::http(code, "dead-lettered by push"),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// `412` is included here only for the *resubmission* PUT/DELETE a conflict
/// resolution issues against a freshly fetched etag (`apply_write_resolution`/
/// `apply_delete_resolution`) — a conflict that recurs even against that etag
/// means contention the engine can't resolve automatically, so it is
/// dead-lettered rather than aborting the rest of the push. The *first* `412`
/// on an op never reaches here: `execute_one` intercepts it and routes it
/// through `resolve_precondition` instead.
fn dead_letter_code(code: u16) -> bool {
    matches!(code, 400 | 403 | 404 | 405 | 409 | 412)
}

enum Outcome {
    Applied,
    Conflict(Resolution),
}

async fn execute_one<T: HttpTransport>(
    client: &CalDavClient<T>,
    calendar_href: &str,
    op: &Op,
    strategy: ConflictStrategy,
    state: &mut CalendarSyncState,
    cancel: &CancelToken,
) -> DavResult<Outcome> {
    match op {
        Op::Create { uid, raw_ical } => {
            let event = ical_event_from_raw(raw_ical, uid)?;
            match client.create_event(calendar_href, &event, cancel).await {
                Ok(meta) => {
                    if let Some(etag) = &meta.etag {
                        state.local_etag_map.insert(meta.href.clone(), etag.clone());
                    }
                    Ok(Outcome::Applied)
                }
                Err(e) if e.is_precondition_failed() => {
                    let href = crate::client::build_event_url(calendar_href, uid)?;
                    let resolution =
                        resolve_precondition(client, calendar_href, &href, raw_ical, strategy, state, cancel)
                            .await?;
                    apply_write_resolution(client, &href, &event, resolution, state, cancel).await
                }
                Err(e) => Err(e),
            }
        }
        Op::Update { href, raw_ical, base_etag } => {
            let event = ical_event_from_raw(raw_ical, href)?;
            match client
                .update_event(href, &event, base_etag.as_deref(), cancel)
                .await
            {
                Ok(new_etag) => {
                    if let Some(etag) = &new_etag {
                        state.local_etag_map.insert(href.clone(), etag.clone());
                    }
                    Ok(Outcome::Applied)
                }
                Err(e) if e.is_precondition_failed() => {
                    let resolution =
                        resolve_precondition(client, calendar_href, href, raw_ical, strategy, state, cancel)
                            .await?;
                    apply_write_resolution(client, href, &event, resolution, state, cancel).await
                }
                Err(e) => Err(e),
            }
        }
        Op::Delete { href, base_etag } => {
            match client.delete_event(href, base_etag.as_deref(), cancel).await {
                Ok(()) => {
                    state.local_etag_map.remove(href);
                    Ok(Outcome::Applied)
                }
                Err(e) if e.is_precondition_failed() => {
                    let resolution =
                        resolve_precondition(client, calendar_href, href, "", strategy, state, cancel).await?;
                    apply_delete_resolution(client, href, resolution, state, cancel).await
                }
                Err(e) => Err(e),
            }
        }
    }
}

/// Carry out a [`Resolution`] reached on a `Create`/`Update` conflict.
/// `ResubmitWithEtag` — `local-wins` and the local-newer branch of
/// `newest-wins` — re-issues the PUT against the fresh etag and only
/// counts as applied once that PUT succeeds; `AcceptRemote` and
/// `NeedsManualResolution` pass through unchanged for `push` to report.
async fn apply_write_resolution<T: HttpTransport>(
    client: &CalDavClient<T>,
    href: &str,
    event: &ICalEvent,
    resolution: Resolution,
    state: &mut CalendarSyncState,
    cancel: &CancelToken,
) -> DavResult<Outcome> {
    match resolution {
        Resolution::ResubmitWithEtag(etag) => {
            let new_etag = client.update_event(href, event, Some(&etag), cancel).await?;
            if let Some(tag) = &new_etag {
                state.local_etag_map.insert(href.to_string(), tag.clone());
            }
            Ok(Outcome::Applied)
        }
        other => Ok(Outcome::Conflict(other)),
    }
}

/// Carry out a [`Resolution`] reached on a `Delete` conflict: a
/// `ResubmitWithEtag` re-issues the DELETE against the fresh etag.
async fn apply_delete_resolution<T: HttpTransport>(
    client: &CalDavClient<T>,
    href: &str,
    resolution: Resolution,
    state: &mut CalendarSyncState,
    cancel: &CancelToken,
) -> DavResult<Outcome> {
    match resolution {
        Resolution::ResubmitWithEtag(etag) => {
            client.delete_event(href, Some(&etag), cancel).await?;
            state.local_etag_map.remove(href);
            Ok(Outcome::Applied)
        }
        other => Ok(Outcome::Conflict(other)),
    }
}

async fn resolve_precondition<T: HttpTransport>(
    client: &CalDavClient<T>,
    calendar_href: &str,
    href: &str,
    local_raw: &str,
    strategy: ConflictStrategy,
    state: &mut CalendarSyncState,
    cancel: &CancelToken,
) -> DavResult<Resolution> {
    let hrefs = vec![href.to_string()];
    let remote = client
        .fetch_events_by_href(calendar_href, &hrefs, cancel)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DavError::http(404, "conflict target vanished during resolution"))?;

    let local = EventWithMetadata {
        href: href.to_string(),
        etag: state.local_etag_map.get(href).cloned(),
        raw_ical: Some(local_raw.to_string()),
    };

    let local_modified = parse_last_modified(local_raw);
    let remote_modified = remote
        .raw_ical
        .as_deref()
        .and_then(parse_last_modified);

    if let Some(etag) = &remote.etag {
        state.local_etag_map.insert(href.to_string(), etag.clone());
    }

    Ok(resolve(strategy, local, remote, local_modified, remote_modified))
}

fn ical_event_from_raw(raw_ical: &str, fallback_key: &str) -> DavResult<ICalEvent> {
    let (calendar, _warnings) = parse_calendar_stream(raw_ical)?;
    calendar.events.into_iter().next().ok_or_else(|| {
        DavError::validation(format!(
            "queued op for {fallback_key} carries no VEVENT"
        ))
    })
}

fn parse_last_modified(raw_ical: &str) -> Option<Instant> {
    let (calendar, _warnings) = parse_calendar_stream(raw_ical).ok()?;
    calendar
        .events
        .first()
        .and_then(|e| e.last_modified.as_ref())
        .map(|dt| dt.timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingObserver {
        events: Vec<ChangeEvent>,
    }

    impl SyncObserver for RecordingObserver {
        fn on_change(&mut self, event: ChangeEvent) {
            self.events.push(event);
        }
    }

    #[test]
    fn state_round_trips_through_serde_json() {
        let mut state = CalendarSyncState::default();
        state.sync_token = Some("token-1".into());
        state.local_etag_map.insert("/cal/a.ics".into(), "etag-a".into());
        state.queue(Op::Delete { href: "/cal/b.ics".into(), base_etag: None });

        let json = serde_json::to_string(&state).unwrap();
        let restored: CalendarSyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.sync_token.as_deref(), Some("token-1"));
        assert_eq!(restored.pending_ops.len(), 1);
    }

    #[test]
    fn drain_coalesced_empties_the_queue() {
        let mut state = CalendarSyncState::default();
        state.queue(Op::Create { uid: "u".into(), raw_ical: "v1".into() });
        state.queue(Op::Update {
            href: "/cal/u.ics".into(),
            raw_ical: "v2".into(),
            base_etag: None,
        });
        let drained = state.drain_coalesced("/cal");
        assert_eq!(drained.len(), 1);
        assert!(state.pending_ops.is_empty());
    }

    #[test]
    fn observer_records_events_in_order() {
        let mut observer = RecordingObserver::default();
        observer.on_change(ChangeEvent::Added(EventWithMetadata {
            href: "/a".into(),
            etag: None,
            raw_ical: None,
        }));
        observer.on_change(ChangeEvent::Deleted("/b".into()));
        assert_eq!(observer.events.len(), 2);
        assert!(matches!(observer.events[0], ChangeEvent::Added(_)));
        assert!(matches!(observer.events[1], ChangeEvent::Deleted(_)));
    }
}
