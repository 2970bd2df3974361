//! RFC 5545 §3.3.11 TEXT escaping.

/// Unescape a raw `TEXT` value as it appeared after the `:`/`;VALUE=...`
/// separator: `\\` → `\`, `\n`/`\N` → newline, `\,` → `,`, `\;` → `;`. Any
/// other backslash-escaped character is passed through literally (the
/// backslash is dropped), matching common permissive server behaviour.
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            Some('n') | Some('N') => {
                out.push('\n');
                chars.next();
            }
            Some(',') => {
                out.push(',');
                chars.next();
            }
            Some(';') => {
                out.push(';');
                chars.next();
            }
            Some(other) => {
                out.push(*other);
                chars.next();
            }
            None => {}
        }
    }
    out
}

/// Escape a `TEXT` value for the wire: the exact reverse of [`unescape_text`].
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_escaped_character() {
        let raw = "a\\b,c;d\ne";
        let unescaped = unescape_text(raw);
        assert_eq!(unescaped, "ab,c;d\ne");
        assert_eq!(escape_text(&unescaped), "a\\b\\,c\\;d\\ne");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(unescape_text("hello world"), "hello world");
        assert_eq!(escape_text("hello world"), "hello world");
    }
}
