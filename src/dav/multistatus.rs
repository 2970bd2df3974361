//! XXE-safe streaming parser for WebDAV `207 Multi-Status` responses.
//!
//! Structured the same way as the streaming multistatus reader in the
//! surrounding pack's CalDAV client crate — a `quick_xml::Reader` pull
//! parser driving a small path-matching state machine — generalized to
//! track one [`PropertyStatus`] per property rather than a single status
//! per response, and hardened against DOCTYPE/entity payloads up front.

use crate::dav::model::{DavProperties, DavResponse, MultiStatus, PropertyStatus};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MultistatusError {
    #[error("xml parsing error: {0}")]
    Xml(String),
    #[error("rejected DOCTYPE/entity content")]
    RejectedDoctype,
}

/// Strip a leading `<?xml ...?>` prolog and any leading `<!DOCTYPE ...>`
/// (including one with an internal `[...]` subset) before the reader ever
/// sees the body. This is the XXE defense: no external entity or internal
/// subset declaration reaches the parser at all.
pub fn strip_xxe_prolog(input: &str) -> Result<String, MultistatusError> {
    let mut s = input.trim_start();
    if let Some(rest) = s.strip_prefix("<?xml") {
        match rest.find("?>") {
            Some(end) => s = rest[end + 2..].trim_start(),
            None => return Err(MultistatusError::RejectedDoctype),
        }
    }
    if s.starts_with("<!DOCTYPE") || s.starts_with("<!doctype") {
        let bytes = s.as_bytes();
        let mut depth = 0i32;
        let mut i = 0;
        let mut closed_at = None;
        while i < bytes.len() {
            match bytes[i] {
                b'[' => depth += 1,
                b']' => depth -= 1,
                b'>' if depth <= 0 => {
                    closed_at = Some(i);
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        match closed_at {
            Some(end) => s = s[end + 1..].trim_start(),
            None => return Err(MultistatusError::RejectedDoctype),
        }
    }
    Ok(s.to_string())
}

fn local_name(raw: &[u8]) -> String {
    let local = match raw.iter().position(|b| *b == b':') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    };
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

/// Percent-decode a href, preserving a literal `+` (i.e. decode
/// percent-escapes only, never `+` → space, unlike form decoding).
fn decode_href(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_status_code(text: &str) -> Option<u16> {
    // "HTTP/1.1 200 OK"
    text.split_whitespace().nth(1).and_then(|s| s.parse().ok())
}

#[derive(Default)]
struct ResponseAccum {
    href: String,
    status: Option<u16>,
    properties: DavProperties,
    etag: Option<String>,
    calendar_data: Option<String>,
}

struct PropstatAccum {
    status: Option<u16>,
    prop_keys: Vec<String>,
}

struct ParserState {
    stack: Vec<String>,
    responses: Vec<DavResponse>,
    sync_token: Option<String>,
    current: ResponseAccum,
    current_propstat: Option<PropstatAccum>,
    /// name of the prop element currently accumulating text, if any
    active_prop: Option<String>,
    /// a property value that spans an inner `href` element, e.g.
    /// `calendar-home-set/href`
    active_prop_is_href_wrapper: bool,
}

impl ParserState {
    fn new() -> Self {
        Self {
            stack: Vec::with_capacity(16),
            responses: Vec::new(),
            sync_token: None,
            current: ResponseAccum::default(),
            current_propstat: None,
            active_prop: None,
            active_prop_is_href_wrapper: false,
        }
    }

    fn path_ends_with(&self, needle: &[&str]) -> bool {
        self.stack.len() >= needle.len() && self.stack[self.stack.len() - needle.len()..] == *needle
    }

    fn on_start(&mut self, event: &BytesStart<'_>) {
        let name = local_name(event.name().as_ref());
        self.stack.push(name.clone());

        match name.as_str() {
            "response" => self.current = ResponseAccum::default(),
            "propstat" => {
                self.current_propstat = Some(PropstatAccum {
                    status: None,
                    prop_keys: Vec::new(),
                })
            }
            _ => {}
        }

        let entering_prop_child = self.stack.len() >= 4
            && self.stack[self.stack.len() - 4..self.stack.len() - 1]
                == ["response", "propstat", "prop"];

        if entering_prop_child {
            let prop_name = name.clone();
            if let Some(p) = &mut self.current_propstat {
                if !p.prop_keys.contains(&prop_name) {
                    p.prop_keys.push(prop_name.clone());
                }
            }
            self.active_prop = Some(prop_name);
            self.active_prop_is_href_wrapper = false;
        } else if self.active_prop.is_some() && name == "href" {
            self.active_prop_is_href_wrapper = true;
        }
    }

    fn on_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        if self.path_ends_with(&["response", "href"]) {
            self.current.href = decode_href(text.trim());
            return;
        }

        if self.path_ends_with(&["response", "status"]) {
            self.current.status = parse_status_code(text.trim());
            return;
        }
        if self.path_ends_with(&["response", "propstat", "status"]) {
            if let Some(p) = &mut self.current_propstat {
                p.status = parse_status_code(text.trim());
            }
            return;
        }
        if self.path_ends_with(&["multistatus", "sync-token"]) {
            self.sync_token = Some(text.trim().to_string());
            return;
        }

        if let Some(prop_name) = self.active_prop.clone() {
            let value = if prop_name == "calendar-data" || prop_name == "calendar-timezone" {
                text.to_string()
            } else if self.active_prop_is_href_wrapper {
                decode_href(text.trim())
            } else {
                text.trim().to_string()
            };
            if value.is_empty() {
                return;
            }
            let entry = self.current.properties.values.entry(prop_name.clone()).or_default();
            entry.push_str(&value);

            if prop_name == "getetag" {
                self.current.etag = Some(entry.clone());
            }
            if prop_name == "calendar-data" {
                self.current.calendar_data = Some(entry.clone());
            }
        }
    }

    fn on_end(&mut self, raw_name: &[u8]) {
        let name = local_name(raw_name);

        if name == "propstat" {
            if let Some(p) = self.current_propstat.take() {
                let code = p.status.unwrap_or(200);
                for key in p.prop_keys {
                    self.current.properties.statuses.insert(
                        key.clone(),
                        PropertyStatus {
                            code,
                            text: format!("HTTP/1.1 {code}"),
                        },
                    );
                    if !(200..300).contains(&code) {
                        self.current.properties.values.remove(&key);
                    }
                }
            }
        }

        if self.active_prop.as_deref() == Some(name.as_str()) {
            self.active_prop = None;
            self.active_prop_is_href_wrapper = false;
        } else if name == "href" {
            self.active_prop_is_href_wrapper = false;
        }

        if name == "response" {
            let finished = std::mem::take(&mut self.current);
            self.responses.push(DavResponse {
                href: finished.href,
                status: finished.status,
                properties: finished.properties,
                etag: finished.etag,
                calendar_data: finished.calendar_data,
            });
        }

        self.stack.pop();
    }

    fn finish(self) -> MultiStatus {
        MultiStatus {
            responses: self.responses,
            sync_token: self.sync_token,
        }
    }
}

fn decode_text(raw: &[u8]) -> Result<String, MultistatusError> {
    match std::str::from_utf8(raw) {
        Ok(s) => Ok(unescape(s)
            .map_err(|e| MultistatusError::Xml(e.to_string()))?
            .into_owned()),
        Err(_) => Ok(String::from_utf8_lossy(raw).into_owned()),
    }
}

/// Parse an aggregated multistatus body. The body may or may not still
/// carry a BOM; quick-xml/UTF-8 decoding tolerates both.
pub fn parse_multistatus(body: &str) -> Result<MultiStatus, MultistatusError> {
    let body = strip_xxe_prolog(body)?;
    let mut xml = Reader::from_str(&body);
    xml.config_mut().trim_text(false);

    let mut state = ParserState::new();
    let mut buf = Vec::with_capacity(8 * 1024);
    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.on_start(&e),
            Ok(Event::Empty(e)) => {
                state.on_start(&e);
                state.on_end(e.name().as_ref());
            }
            Ok(Event::Text(e)) => {
                let text = decode_text(e.as_ref())?;
                state.on_text(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                state.on_text(&text);
            }
            Ok(Event::End(e)) => state.on_end(e.name().as_ref()),
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) => return Err(MultistatusError::RejectedDoctype),
            Err(e) => return Err(MultistatusError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(state.finish())
}

/// `sync-collection` treats a `404` response as a deletion marker; any
/// response with a 2xx status but no `calendar-data` is surfaced as an
/// "added href" so the caller can resolve it with `calendar-multiget`.
pub struct SyncCollectionResult {
    pub deleted: Vec<String>,
    pub changed_with_data: Vec<DavResponse>,
    pub added_hrefs: Vec<(String, Option<String>)>,
    pub sync_token: Option<String>,
}

pub fn interpret_sync_collection(ms: MultiStatus) -> SyncCollectionResult {
    let mut deleted = Vec::new();
    let mut changed_with_data = Vec::new();
    let mut added_hrefs = Vec::new();

    for response in ms.responses {
        match response.status {
            Some(404) => deleted.push(response.href),
            _ if response.calendar_data.is_some() => changed_with_data.push(response),
            _ => added_hrefs.push((response.href, response.etag)),
        }
    }

    SyncCollectionResult {
        deleted,
        changed_with_data,
        added_hrefs,
        sync_token: ms.sync_token,
    }
}
