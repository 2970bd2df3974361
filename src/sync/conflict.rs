//! Conflict-resolution strategies for `412 Precondition Failed` responses
//! encountered while pushing a queued [`super::queue::Op`] (§4.6).

use crate::dav::model::EventWithMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Discard the local change; adopt the server's version outright.
    ServerWins,
    /// Refetch to learn the new etag, then resubmit the local change with it.
    LocalWins,
    /// Compare `LAST-MODIFIED`; the later wins, ties break toward the server.
    NewestWins,
    /// Surface both versions to the caller; the op stays queued until the
    /// caller resolves it explicitly.
    Manual,
}

/// What the engine should do next after applying a strategy to a `412`.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Adopt the server's copy; drop the local op.
    AcceptRemote(EventWithMetadata),
    /// Resubmit the local body against the server's current etag.
    ResubmitWithEtag(String),
    /// The caller must decide; keep the op queued and hand back both sides.
    NeedsManualResolution {
        local: Box<EventWithMetadata>,
        remote: Box<EventWithMetadata>,
    },
}

/// `local_modified`/`remote_modified` are `LAST-MODIFIED` timestamps parsed
/// out of each side's iCalendar body, when present — `newest-wins` falls
/// back to favouring the server when either is unknown.
pub fn resolve(
    strategy: ConflictStrategy,
    local: EventWithMetadata,
    remote: EventWithMetadata,
    local_modified: Option<crate::ical::model::Instant>,
    remote_modified: Option<crate::ical::model::Instant>,
) -> Resolution {
    match strategy {
        ConflictStrategy::ServerWins => Resolution::AcceptRemote(remote),
        ConflictStrategy::LocalWins => {
            let etag = remote.etag.clone().unwrap_or_default();
            Resolution::ResubmitWithEtag(etag)
        }
        ConflictStrategy::NewestWins => match (local_modified, remote_modified) {
            (Some(l), Some(r)) if l > r => {
                Resolution::ResubmitWithEtag(remote.etag.clone().unwrap_or_default())
            }
            _ => Resolution::AcceptRemote(remote),
        },
        ConflictStrategy::Manual => Resolution::NeedsManualResolution {
            local: Box::new(local),
            remote: Box::new(remote),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(href: &str, etag: &str) -> EventWithMetadata {
        EventWithMetadata {
            href: href.to_string(),
            etag: Some(etag.to_string()),
            raw_ical: None,
        }
    }

    #[test]
    fn server_wins_adopts_remote() {
        let res = resolve(
            ConflictStrategy::ServerWins,
            event("/h", "local-etag"),
            event("/h", "remote-etag"),
            None,
            None,
        );
        assert!(matches!(res, Resolution::AcceptRemote(e) if e.etag.as_deref() == Some("remote-etag")));
    }

    #[test]
    fn local_wins_resubmits_with_remote_etag() {
        let res = resolve(
            ConflictStrategy::LocalWins,
            event("/h", "local-etag"),
            event("/h", "remote-etag"),
            None,
            None,
        );
        assert!(matches!(res, Resolution::ResubmitWithEtag(e) if e == "remote-etag"));
    }

    #[test]
    fn newest_wins_breaks_ties_toward_server() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let res = resolve(
            ConflictStrategy::NewestWins,
            event("/h", "local-etag"),
            event("/h", "remote-etag"),
            Some(t),
            Some(t),
        );
        assert!(matches!(res, Resolution::AcceptRemote(_)));
    }

    #[test]
    fn newest_wins_favours_later_local_edit() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        let res = resolve(
            ConflictStrategy::NewestWins,
            event("/h", "local-etag"),
            event("/h", "remote-etag"),
            Some(later),
            Some(earlier),
        );
        assert!(matches!(res, Resolution::ResubmitWithEtag(e) if e == "remote-etag"));
    }

    #[test]
    fn manual_surfaces_both_sides() {
        let res = resolve(
            ConflictStrategy::Manual,
            event("/h", "local-etag"),
            event("/h", "remote-etag"),
            None,
            None,
        );
        assert!(matches!(res, Resolution::NeedsManualResolution { .. }));
    }
}
