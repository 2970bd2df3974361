//! UID sanitisation for URL path construction (§4.4). The stored UID inside
//! the iCalendar object is never altered — only the derived URL path
//! segment is, and only after validating the UID is safe to address at all.

use crate::error::DavError;

/// Replace every character outside `[A-Za-z0-9@._-]` with `_`. Blank UIDs,
/// UIDs containing `..`, UIDs that are only dots, and UIDs that collapse to
/// empty after trimming dots are rejected rather than sanitised.
pub fn sanitize_uid(uid: &str) -> Result<String, DavError> {
    if uid.trim().is_empty() {
        return Err(DavError::validation("uid must not be blank"));
    }
    if uid.contains("..") {
        return Err(DavError::validation("uid must not contain '..'"));
    }
    if uid.chars().all(|c| c == '.') {
        return Err(DavError::validation("uid must not be dots only"));
    }
    let sanitized: String = uid
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.trim_matches('.').is_empty() {
        return Err(DavError::validation(
            "uid collapses to empty after trimming dots",
        ));
    }
    Ok(sanitized)
}

/// Build the `.ics` resource path for `uid` under `calendar_href`, per
/// §8's UID-safety invariant: the result contains only
/// `[A-Za-z0-9@._/-]` and no `..` segments.
pub fn build_event_url(calendar_href: &str, uid: &str) -> Result<String, DavError> {
    let safe_uid = sanitize_uid(uid)?;
    let base = calendar_href.trim_end_matches('/');
    Ok(format!("{base}/{safe_uid}.ics"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize_uid("a b/c?@x.com").unwrap(), "a_b_c_@x.com");
    }

    #[test]
    fn rejects_blank_uid() {
        assert!(sanitize_uid("").is_err());
        assert!(sanitize_uid("   ").is_err());
    }

    #[test]
    fn rejects_dotdot() {
        assert!(sanitize_uid("a..b").is_err());
    }

    #[test]
    fn rejects_dots_only() {
        assert!(sanitize_uid("...").is_err());
    }

    #[test]
    fn built_url_contains_only_safe_characters() {
        let url = build_event_url("/calendars/me/", "weird uid!@2026.com").unwrap();
        assert!(url.starts_with("/calendars/me/"));
        assert!(
            url.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '/' | '-'))
        );
        assert!(!url.contains(".."));
    }
}
