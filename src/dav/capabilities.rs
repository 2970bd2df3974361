//! Parses `OPTIONS` responses into [`ServerCapabilities`].

use crate::dav::model::ServerCapabilities;
use chrono::Utc;
use std::collections::BTreeSet;

/// `dav_header` is the raw `DAV:` response header value (comma-separated
/// compliance classes); `allow_header` is the raw `Allow:` header value.
pub fn parse_capabilities(dav_header: &str, allow_header: &str) -> ServerCapabilities {
    let dav_classes = dav_header
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect::<BTreeSet<_>>();

    let allowed_methods = allow_header
        .split(',')
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty())
        .collect::<BTreeSet<_>>();

    ServerCapabilities {
        dav_classes,
        allowed_methods,
        raw_dav_header: dav_header.to_string(),
        discovered_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_icloud_style_dav_header() {
        let caps = parse_capabilities(
            "1, 2, access-control, calendar-access, addressbook",
            "OPTIONS, GET, HEAD, POST, PUT, DELETE, PROPFIND, PROPPATCH, REPORT, MKCALENDAR",
        );
        assert!(caps.supports_caldav());
        assert!(caps.supports_acl());
        assert!(caps.supports_mkcalendar());
        assert!(!caps.supports_sync_collection());
    }

    #[test]
    fn detects_sync_collection_support() {
        let caps = parse_capabilities("1, 2, 3, calendar-access", "OPTIONS, GET, REPORT");
        assert!(caps.supports_sync_collection());
    }
}
