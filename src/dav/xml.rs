//! WebDAV/CalDAV request body builders.
//!
//! Namespace prefixes are parameterized: `calendar-query` and
//! `calendar-multiget` must use lowercase `d:`/`c:` to satisfy iCloud, while
//! other requests may use uppercase — the quirks layer picks the case per
//! request, this module just renders whichever it's told.

use crate::dav::model::{Ace, Principal, Privilege};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DavXmlError {
    #[error("value is not URL-safe: {0}")]
    UnsafeUrl(String),
    #[error("xml build error: {0}")]
    Build(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixCase {
    Lower,
    Upper,
}

impl PrefixCase {
    fn dav(self) -> &'static str {
        match self {
            PrefixCase::Lower => "d",
            PrefixCase::Upper => "D",
        }
    }

    fn cal(self) -> &'static str {
        match self {
            PrefixCase::Lower => "c",
            PrefixCase::Upper => "C",
        }
    }
}

/// Escape `<`, `>`, `&`, `'`, `"` for insertion into XML text or attribute
/// content.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Validate a URL value is safe to insert unescaped (no XML metacharacters,
/// no control characters). Hrefs and scheduling recipients go through this
/// before being written verbatim.
pub fn validate_url_safe(value: &str) -> Result<(), DavXmlError> {
    if value
        .chars()
        .any(|c| matches!(c, '<' | '>' | '&' | '"' | '\'') || c.is_control())
    {
        return Err(DavXmlError::UnsafeUrl(value.to_string()));
    }
    Ok(())
}

fn href_element(prefix: PrefixCase, href: &str) -> Result<String, DavXmlError> {
    validate_url_safe(href)?;
    let d = prefix.dav();
    Ok(format!("<{d}:href>{href}</{d}:href>"))
}

/// Namespace prefixes `build_propfind_body` knows how to declare beyond the
/// always-present `DAV:`/CalDAV pair, keyed by the prefix callers pass in
/// `props` (e.g. `"CS:getctag"`). Declared only when a requested prop
/// actually uses them, so a plain `current-user-principal` PROPFIND doesn't
/// carry namespaces it never references.
const EXTRA_NAMESPACES: &[(&str, &str)] = &[
    ("A", "http://apple.com/ns/ical/"),
    ("CS", "http://calendarserver.org/ns/"),
];

pub fn build_propfind_body(props: &[&str], prefix: PrefixCase) -> String {
    let d = prefix.dav();
    let c = prefix.cal();
    let mut xmlns = format!(r#"xmlns:{d}="DAV:" xmlns:{c}="urn:ietf:params:xml:ns:caldav""#);
    for (ns_prefix, uri) in EXTRA_NAMESPACES {
        if props.iter().any(|p| p.starts_with(&format!("{ns_prefix}:"))) {
            xmlns.push_str(&format!(r#" xmlns:{ns_prefix}="{uri}""#));
        }
    }
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><{d}:propfind {xmlns}><{d}:prop>"#
    );
    for prop in props {
        body.push('<');
        body.push_str(prop);
        body.push_str("/>");
    }
    body.push_str(&format!("</{d}:prop></{d}:propfind>"));
    body
}

pub fn build_calendar_query_body(
    component: &str,
    start: Option<&str>,
    end: Option<&str>,
    include_data: bool,
    prefix: PrefixCase,
) -> String {
    let d = prefix.dav();
    let c = prefix.cal();
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><{c}:calendar-query xmlns:{d}="DAV:" xmlns:{c}="urn:ietf:params:xml:ns:caldav"><{d}:prop><{d}:getetag/>"#
    );
    if include_data {
        body.push_str(&format!("<{c}:calendar-data/>"));
    }
    body.push_str(&format!("</{d}:prop><{c}:filter><{c}:comp-filter name=\"VCALENDAR\"><{c}:comp-filter name=\"{component}\">"));
    if let (Some(s), Some(e)) = (start, end) {
        body.push_str(&format!(
            "<{c}:time-range start=\"{s}\" end=\"{e}\"/>"
        ));
    }
    body.push_str(&format!(
        "</{c}:comp-filter></{c}:comp-filter></{c}:filter></{c}:calendar-query>"
    ));
    body
}

pub fn build_calendar_multiget_body(
    hrefs: &[String],
    include_data: bool,
    prefix: PrefixCase,
) -> Result<String, DavXmlError> {
    let d = prefix.dav();
    let c = prefix.cal();
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><{c}:calendar-multiget xmlns:{d}="DAV:" xmlns:{c}="urn:ietf:params:xml:ns:caldav"><{d}:prop><{d}:getetag/>"#
    );
    if include_data {
        body.push_str(&format!("<{c}:calendar-data/>"));
    }
    body.push_str(&format!("</{d}:prop>"));
    for href in hrefs {
        body.push_str(&href_element(prefix, href)?);
    }
    body.push_str(&format!("</{c}:calendar-multiget>"));
    Ok(body)
}

pub fn build_sync_collection_body(
    sync_token: Option<&str>,
    limit: Option<u32>,
    include_data: bool,
    prefix: PrefixCase,
) -> String {
    let d = prefix.dav();
    let c = prefix.cal();
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><{d}:sync-collection xmlns:{d}="DAV:" xmlns:{c}="urn:ietf:params:xml:ns:caldav">"#
    );
    match sync_token {
        Some(token) => {
            body.push_str(&format!("<{d}:sync-token>"));
            body.push_str(&escape_xml(token));
            body.push_str(&format!("</{d}:sync-token>"));
        }
        None => body.push_str(&format!("<{d}:sync-token/>")),
    }
    body.push_str(&format!("<{d}:sync-level>1</{d}:sync-level><{d}:prop><{d}:getetag/>"));
    if include_data {
        body.push_str(&format!("<{c}:calendar-data/>"));
    }
    body.push_str(&format!("</{d}:prop>"));
    if let Some(limit) = limit {
        body.push_str(&format!("<{d}:limit><{d}:nresults>{limit}</{d}:nresults></{d}:limit>"));
    }
    body.push_str(&format!("</{d}:sync-collection>"));
    body
}

pub fn build_mkcalendar_body(
    name: &str,
    description: Option<&str>,
    color: Option<&str>,
    extended: bool,
) -> String {
    let tag = if extended { "mkcol" } else { "mkcalendar" };
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><C:{tag} xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav" xmlns:A="http://apple.com/ns/ical/" xmlns:CS="http://calendarserver.org/ns/">"#
    );
    body.push_str("<D:set><D:prop>");
    if extended {
        body.push_str("<D:resourcetype><D:collection/><C:calendar/></D:resourcetype>");
    }
    body.push_str("<D:displayname>");
    body.push_str(&escape_xml(name));
    body.push_str("</D:displayname>");
    if let Some(desc) = description {
        body.push_str("<C:calendar-description>");
        body.push_str(&escape_xml(desc));
        body.push_str("</C:calendar-description>");
    }
    if let Some(color) = color {
        body.push_str("<A:calendar-color>");
        body.push_str(&escape_xml(color));
        body.push_str("</A:calendar-color>");
    }
    body.push_str(&format!("</D:prop></D:set></C:{tag}>"));
    body
}

fn privilege_element(p: Privilege) -> &'static str {
    match p {
        Privilege::Read => "<D:read/>",
        Privilege::Write => "<D:write/>",
        Privilege::WriteProperties => "<D:write-properties/>",
        Privilege::WriteContent => "<D:write-content/>",
        Privilege::Unlock => "<D:unlock/>",
        Privilege::ReadAcl => "<D:read-acl/>",
        Privilege::WriteAcl => "<D:write-acl/>",
        Privilege::ReadCurrentUserPrivilegeSet => "<D:read-current-user-privilege-set/>",
        Privilege::Bind => "<D:bind/>",
        Privilege::Unbind => "<D:unbind/>",
        Privilege::All => "<D:all/>",
    }
}

fn principal_element(p: &Principal) -> Result<String, DavXmlError> {
    Ok(match p {
        Principal::Href(href) => {
            validate_url_safe(href)?;
            format!("<D:principal><D:href>{href}</D:href></D:principal>")
        }
        Principal::All => "<D:principal><D:all/></D:principal>".to_string(),
        Principal::Authenticated => "<D:principal><D:authenticated/></D:principal>".to_string(),
        Principal::Unauthenticated => {
            "<D:principal><D:unauthenticated/></D:principal>".to_string()
        }
        Principal::SelfPrincipal => "<D:principal><D:self/></D:principal>".to_string(),
        Principal::Property(name) => {
            format!("<D:principal><D:property><{}/></D:property></D:principal>", escape_xml(name))
        }
    })
}

pub fn build_acl_body(aces: &[Ace]) -> Result<String, DavXmlError> {
    let mut body =
        r#"<?xml version="1.0" encoding="UTF-8"?><D:acl xmlns:D="DAV:">"#.to_string();
    for ace in aces {
        body.push_str("<D:ace>");
        body.push_str(&principal_element(&ace.principal)?);
        if !ace.grant.is_empty() {
            body.push_str("<D:grant>");
            for p in &ace.grant {
                body.push_str(&format!("<D:privilege>{}</D:privilege>", privilege_element(*p)));
            }
            body.push_str("</D:grant>");
        }
        if !ace.deny.is_empty() {
            body.push_str("<D:deny>");
            for p in &ace.deny {
                body.push_str(&format!("<D:privilege>{}</D:privilege>", privilege_element(*p)));
            }
            body.push_str("</D:deny>");
        }
        body.push_str("</D:ace>");
    }
    body.push_str("</D:acl>");
    Ok(body)
}

pub fn build_free_busy_query_body(start: &str, end: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><C:free-busy-query xmlns:C="urn:ietf:params:xml:ns:caldav"><C:time-range start="{start}" end="{end}"/></C:free-busy-query>"#
    )
}

/// A per-recipient result inside a `schedule-response` (RFC 6638 §3.6).
#[derive(Debug, Clone)]
pub struct ScheduleRecipientResponse {
    pub recipient: String,
    pub request_status: String,
    pub calendar_data: Option<String>,
}

pub fn build_schedule_response_body(
    responses: &[ScheduleRecipientResponse],
) -> Result<String, DavXmlError> {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><C:schedule-response xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">"#
    );
    for r in responses {
        validate_url_safe(&r.recipient)?;
        body.push_str("<C:response><C:recipient><D:href>");
        body.push_str(&r.recipient);
        body.push_str("</D:href></C:recipient><C:request-status>");
        body.push_str(&escape_xml(&r.request_status));
        body.push_str("</C:request-status>");
        if let Some(data) = &r.calendar_data {
            body.push_str("<C:calendar-data><![CDATA[");
            body.push_str(data);
            body.push_str("]]></C:calendar-data>");
        }
        body.push_str("</C:response>");
    }
    body.push_str("</C:schedule-response>");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_characters() {
        assert_eq!(escape_xml("<a & 'b' \"c\">"), "&lt;a &amp; &apos;b&apos; &quot;c&quot;&gt;");
    }

    #[test]
    fn lowercase_prefix_used_for_icloud_compatible_queries() {
        let body = build_calendar_query_body("VEVENT", None, None, true, PrefixCase::Lower);
        assert!(body.contains("<c:calendar-query"));
        assert!(body.contains("<d:prop>"));
    }

    #[test]
    fn rejects_unsafe_href() {
        let err = build_calendar_multiget_body(
            &["/cal/\"><script>.ics".to_string()],
            true,
            PrefixCase::Upper,
        );
        assert!(err.is_err());
    }
}
