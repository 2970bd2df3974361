//! The high-level CalDAV client (§4.4): discovery, CRUD, calendar-query,
//! multiget, sync-collection, ACL and scheduling, layered over the
//! [`HttpTransport`] seam so request/response plumbing is swappable.
//!
//! Every public method returns a [`DavResult<T>`] — no exceptions cross
//! this boundary; servers answering non-2xx, transport failures, and
//! malformed responses all come back through the `Err` arm.

use std::sync::Arc;

use hyper::{HeaderMap, Method, Uri, header};
use tracing::{debug, warn};

use crate::capabilities_cache::CapabilitiesCache;
use crate::client::types::{
    Account, CalendarListing, EtagEntry, FreeBusyResult, SchedulingResult, SchedulingUrls,
    SyncResult,
};
use crate::client::uid::build_event_url;
use crate::config::ClientConfig;
use crate::dav::acl::parse_acl;
use crate::dav::capabilities::parse_capabilities;
use crate::dav::model::{Ace, Acl, EventWithMetadata, ServerCapabilities};
use crate::dav::multistatus::{interpret_sync_collection, parse_multistatus};
use crate::dav::xml::{
    PrefixCase, ScheduleRecipientResponse, build_acl_body, build_calendar_multiget_body,
    build_calendar_query_body, build_free_busy_query_body, build_mkcalendar_body,
    build_propfind_body, build_sync_collection_body, validate_url_safe,
};
use crate::error::{DavError, DavResult};
use crate::ical::generator::generate_calendar;
use crate::ical::model::{ICalCalendar, ICalEvent, Instant};
use crate::quirks::Quirks;
use crate::transport::{CancelToken, HttpTransport, HyperTransport, RawResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Depth {
    Zero,
    One,
}

impl Depth {
    fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
        }
    }
}

/// Wrap a single event in the minimal `VCALENDAR` envelope it needs to be
/// PUT to the server as a standalone resource.
fn wrap_event(event: &ICalEvent) -> ICalCalendar {
    ICalCalendar {
        prod_id: "-//icaldav//EN".to_string(),
        version: "2.0".to_string(),
        events: vec![event.clone()],
        todos: Vec::new(),
        journals: Vec::new(),
        timezones: Default::default(),
    }
}

/// Strip surrounding double quotes from an ETag as it arrives on the wire.
fn unquote_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

/// Reinstate the quoting an ETag is conventionally carried in for
/// `If-Match`/`If-None-Match`.
fn quote_etag(etag: &str) -> String {
    if etag.starts_with('"') {
        etag.to_string()
    } else {
        format!("\"{etag}\"")
    }
}

fn format_timerange_instant(instant: Instant) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// The CalDAV client. Generic over [`HttpTransport`] so tests can swap in a
/// scripted fake without a real server; [`HyperTransport`] is the default
/// production transport.
#[derive(Clone)]
pub struct CalDavClient<T: HttpTransport = HyperTransport> {
    base: Uri,
    transport: Arc<T>,
    quirks: Arc<Quirks>,
    capabilities: CapabilitiesCache,
    config: ClientConfig,
}

impl CalDavClient<HyperTransport> {
    /// Build a client backed by the production `hyper` transport, selecting
    /// [`Quirks`] by the base URL's hostname.
    pub fn new(
        base_url: &str,
        auth: Arc<dyn crate::transport::AuthProvider>,
        config: ClientConfig,
    ) -> DavResult<Self> {
        let base: Uri = base_url
            .parse()
            .map_err(|e| DavError::validation(format!("invalid base URL: {e}")))?;
        let quirks = Arc::new(
            base.host()
                .map(Quirks::for_host)
                .unwrap_or_else(Quirks::standard),
        );
        let transport = Arc::new(HyperTransport::new(&config, auth)?);
        let capabilities = CapabilitiesCache::new(&config.capabilities_cache);
        Ok(Self {
            base,
            transport,
            quirks,
            capabilities,
            config,
        })
    }
}

impl<T: HttpTransport> CalDavClient<T> {
    /// Construct a client around an arbitrary [`HttpTransport`] — the seam
    /// tests use to avoid a live server.
    pub fn with_transport(
        base_url: &str,
        transport: T,
        quirks: Quirks,
        config: ClientConfig,
    ) -> DavResult<Self> {
        let base: Uri = base_url
            .parse()
            .map_err(|e| DavError::validation(format!("invalid base URL: {e}")))?;
        let capabilities = CapabilitiesCache::new(&config.capabilities_cache);
        Ok(Self {
            base,
            transport: Arc::new(transport),
            quirks: Arc::new(quirks),
            capabilities,
            config,
        })
    }

    pub fn quirks(&self) -> &Quirks {
        &self.quirks
    }

    fn build_uri(&self, path: &str) -> DavResult<Uri> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path
                .parse()
                .map_err(|e| DavError::validation(format!("invalid URL {path}: {e}")));
        }

        let mut parts = self.base.clone().into_parts();
        let existing_path = parts
            .path_and_query
            .as_ref()
            .map(|pq| pq.path())
            .unwrap_or("/");

        let (path_only, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let mut combined = if path_only.is_empty() {
            existing_path.to_string()
        } else if path_only.starts_with('/') {
            path_only.to_string()
        } else {
            let mut base = existing_path.trim_end_matches('/').to_string();
            if base.is_empty() {
                base.push('/');
            }
            if !base.ends_with('/') {
                base.push('/');
            }
            base.push_str(path_only);
            base
        };
        if combined.is_empty() {
            combined.push('/');
        }

        let path_and_query = match query {
            Some(q) => format!("{combined}?{q}")
                .parse()
                .map_err(|e| DavError::validation(format!("invalid path {path}: {e}")))?,
            None => combined
                .parse()
                .map_err(|e| DavError::validation(format!("invalid path {path}: {e}")))?,
        };
        parts.path_and_query = Some(path_and_query);
        Uri::from_parts(parts).map_err(|e| DavError::validation(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        mut headers: HeaderMap,
        body: Option<bytes::Bytes>,
        cancel: &CancelToken,
    ) -> DavResult<RawResponse> {
        let uri = self.build_uri(path)?;
        if body.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("application/xml; charset=utf-8"),
            );
        }
        let response = self
            .transport
            .send(method.clone(), uri, headers, body, cancel)
            .await?;
        if response.body.len() as u64 > self.config.max_response_bytes {
            warn!(
                path,
                len = response.body.len(),
                "response exceeded max_response_bytes"
            );
            return Err(DavError::http(413, "response too large"));
        }
        Ok(response)
    }

    fn require_success(response: RawResponse, context: &str) -> DavResult<RawResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(DavError::http(
                response.status,
                format!("{context} failed with HTTP {}", response.status),
            ))
        }
    }

    // ---------------------------------------------------------------
    // Discovery (RFC 6764)
    // ---------------------------------------------------------------

    /// Walk the RFC 6764 well-known redirect → principal →
    /// calendar-home-set → calendar collections chain.
    pub async fn discover_account(&self, cancel: &CancelToken) -> DavResult<Account> {
        debug!("discover_account: starting RFC 6764 chain");
        let principal = self.discover_current_user_principal(cancel).await?;
        let Some(principal) = principal else {
            return Err(DavError::http(404, "no current-user-principal found"));
        };

        let calendar_home_set = self.discover_calendar_home_set(&principal, cancel).await?;
        let mut calendars = Vec::new();
        for home in &calendar_home_set {
            calendars.extend(self.list_calendars(home, cancel).await?);
        }

        Ok(Account {
            principal,
            calendar_home_set,
            calendars,
        })
    }

    pub async fn discover_current_user_principal(
        &self,
        cancel: &CancelToken,
    ) -> DavResult<Option<String>> {
        let body = build_propfind_body(&["D:current-user-principal"], PrefixCase::Upper);
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::Zero.as_str()));
        let response = self
            .send(Method::from_bytes(b"PROPFIND").expect("valid method token"), "", headers, Some(body.into()), cancel)
            .await?;
        let response = Self::require_success(response, "PROPFIND current-user-principal")?;
        let ms = parse_multistatus(response.body_str()?)?;
        Ok(ms
            .responses
            .into_iter()
            .find_map(|r| r.properties.get("current-user-principal").map(str::to_string))
            .or_else(|| ms.responses.first().map(|r| r.href.clone())))
    }

    pub async fn discover_calendar_home_set(
        &self,
        principal_href: &str,
        cancel: &CancelToken,
    ) -> DavResult<Vec<String>> {
        let body = build_propfind_body(&["C:calendar-home-set"], PrefixCase::Upper);
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::Zero.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("valid method token"),
                principal_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "PROPFIND calendar-home-set")?;
        let ms = parse_multistatus(response.body_str()?)?;
        let mut homes: Vec<String> = ms
            .responses
            .into_iter()
            .filter_map(|r| r.properties.get("calendar-home-set").map(str::to_string))
            .collect();
        if self.quirks.requires_direct_calendar_addressing && homes.is_empty() {
            homes.push(principal_href.to_string());
        }
        homes.sort();
        homes.dedup();
        Ok(homes)
    }

    pub async fn list_calendars(
        &self,
        home_href: &str,
        cancel: &CancelToken,
    ) -> DavResult<Vec<CalendarListing>> {
        let body = build_propfind_body(
            &[
                "D:displayname",
                "C:calendar-description",
                "A:calendar-color",
                "CS:getctag",
                "D:sync-token",
                "C:supported-calendar-component-set",
                "D:resourcetype",
            ],
            PrefixCase::Upper,
        );
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::One.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("valid method token"),
                home_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "PROPFIND calendars")?;
        let ms = parse_multistatus(response.body_str()?)?;

        let calendars = ms
            .responses
            .into_iter()
            .filter(|r| r.properties.get("resourcetype").is_some() || r.href != home_href)
            .map(|r| CalendarListing {
                href: r.href,
                displayname: r.properties.get("displayname").map(str::to_string),
                description: r.properties.get("calendar-description").map(str::to_string),
                color: r.properties.get("calendar-color").map(str::to_string),
                ctag: r.properties.get("getctag").map(str::to_string),
                sync_token: r.properties.get("sync-token").map(str::to_string),
                supported_components: Vec::new(),
            })
            .collect();
        Ok(calendars)
    }

    // ---------------------------------------------------------------
    // Capabilities (§4.7)
    // ---------------------------------------------------------------

    pub async fn get_capabilities(
        &self,
        url: &str,
        force: bool,
        cancel: &CancelToken,
    ) -> DavResult<ServerCapabilities> {
        let host = self
            .build_uri(url)?
            .host()
            .unwrap_or_default()
            .to_string();
        if !force
            && let Some(cached) = self.capabilities.get(&host)
        {
            return Ok(cached);
        }

        let response = self
            .send(Method::OPTIONS, url, HeaderMap::new(), None, cancel)
            .await?;
        let response = Self::require_success(response, "OPTIONS")?;
        let dav_header = response.header("dav").unwrap_or_default();
        let allow_header = response.header("allow").unwrap_or_default();
        let caps = parse_capabilities(dav_header, allow_header);
        self.capabilities.insert(host, caps.clone());
        Ok(caps)
    }

    // ---------------------------------------------------------------
    // Event CRUD and query (§4.4)
    // ---------------------------------------------------------------

    fn query_prefix(&self) -> PrefixCase {
        self.quirks.xml_prefix_case
    }

    pub async fn fetch_events(
        &self,
        calendar_href: &str,
        start: Option<Instant>,
        end: Option<Instant>,
        cancel: &CancelToken,
    ) -> DavResult<Vec<EventWithMetadata>> {
        let start_s = start.map(format_timerange_instant);
        let end_s = end.map(format_timerange_instant);
        let body = build_calendar_query_body(
            "VEVENT",
            start_s.as_deref(),
            end_s.as_deref(),
            true,
            self.query_prefix(),
        );
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::One.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"REPORT").expect("valid method token"),
                calendar_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "REPORT calendar-query")?;
        let ms = parse_multistatus(response.body_str()?)?;
        Ok(ms
            .responses
            .into_iter()
            .map(|r| EventWithMetadata {
                href: r.href,
                etag: r.etag.map(|e| unquote_etag(&e)),
                raw_ical: r.calendar_data,
            })
            .collect())
    }

    pub async fn fetch_events_by_href(
        &self,
        calendar_href: &str,
        hrefs: &[String],
        cancel: &CancelToken,
    ) -> DavResult<Vec<EventWithMetadata>> {
        if hrefs.is_empty() {
            return Ok(Vec::new());
        }
        let body = build_calendar_multiget_body(hrefs, true, self.query_prefix())?;
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::One.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"REPORT").expect("valid method token"),
                calendar_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "REPORT calendar-multiget")?;
        let ms = parse_multistatus(response.body_str()?)?;
        Ok(ms
            .responses
            .into_iter()
            .map(|r| EventWithMetadata {
                href: r.href,
                etag: r.etag.map(|e| unquote_etag(&e)),
                raw_ical: r.calendar_data,
            })
            .collect())
    }

    pub async fn fetch_etags_in_range(
        &self,
        calendar_href: &str,
        start: Instant,
        end: Instant,
        cancel: &CancelToken,
    ) -> DavResult<Vec<EtagEntry>> {
        let body = build_calendar_query_body(
            "VEVENT",
            Some(&format_timerange_instant(start)),
            Some(&format_timerange_instant(end)),
            false,
            self.query_prefix(),
        );
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::One.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"REPORT").expect("valid method token"),
                calendar_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "REPORT calendar-query (etags only)")?;
        let ms = parse_multistatus(response.body_str()?)?;
        Ok(ms
            .responses
            .into_iter()
            .map(|r| EtagEntry {
                href: r.href,
                etag: r.etag.map(|e| unquote_etag(&e)),
            })
            .collect())
    }

    pub async fn get_ctag(
        &self,
        calendar_href: &str,
        cancel: &CancelToken,
    ) -> DavResult<Option<String>> {
        let body = build_propfind_body(&["CS:getctag"], PrefixCase::Upper);
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::Zero.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("valid method token"),
                calendar_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "PROPFIND getctag")?;
        let ms = parse_multistatus(response.body_str()?)?;
        Ok(ms
            .responses
            .into_iter()
            .find_map(|r| r.properties.get("getctag").map(str::to_string)))
    }

    pub async fn get_sync_token(
        &self,
        calendar_href: &str,
        cancel: &CancelToken,
    ) -> DavResult<Option<String>> {
        let body = build_propfind_body(&["D:sync-token"], PrefixCase::Upper);
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::Zero.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("valid method token"),
                calendar_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "PROPFIND sync-token")?;
        let ms = parse_multistatus(response.body_str()?)?;
        Ok(ms
            .responses
            .into_iter()
            .find_map(|r| r.properties.get("sync-token").map(str::to_string)))
    }

    /// `PUT` with `If-None-Match: *` — creation fails with `412` if a
    /// resource already exists at the derived href. `event` is wrapped in a
    /// minimal `VCALENDAR` and generated through `ical::generator`.
    pub async fn create_event(
        &self,
        calendar_href: &str,
        event: &ICalEvent,
        cancel: &CancelToken,
    ) -> DavResult<EventWithMetadata> {
        let href = build_event_url(calendar_href, &event.uid)?;
        let raw_ical = generate_calendar(&wrap_event(event));
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, header::HeaderValue::from_static("*"));
        let response = self
            .send(Method::PUT, &href, headers, Some(raw_ical.clone().into()), cancel)
            .await?;
        let response = Self::require_success(response, "PUT create_event")?;
        let etag = response.header("etag").map(unquote_etag);
        Ok(EventWithMetadata {
            href,
            etag,
            raw_ical: Some(raw_ical),
        })
    }

    /// `PUT` with `If-Match` when `etag` is supplied. A `412` is surfaced
    /// verbatim — this method never retries transparently.
    pub async fn update_event(
        &self,
        href: &str,
        event: &ICalEvent,
        etag: Option<&str>,
        cancel: &CancelToken,
    ) -> DavResult<Option<String>> {
        let raw_ical = generate_calendar(&wrap_event(event));
        let mut headers = HeaderMap::new();
        if let Some(etag) = etag {
            let value = quote_etag(etag);
            headers.insert(
                header::IF_MATCH,
                header::HeaderValue::from_str(&value)
                    .map_err(|e| DavError::validation(e.to_string()))?,
            );
        }
        let response = self
            .send(Method::PUT, href, headers, Some(raw_ical.into()), cancel)
            .await?;
        let response = Self::require_success(response, "PUT update_event")?;
        Ok(response.header("etag").map(unquote_etag))
    }

    /// `DELETE`; a `404` (already gone) is treated as success.
    pub async fn delete_event(
        &self,
        href: &str,
        etag: Option<&str>,
        cancel: &CancelToken,
    ) -> DavResult<()> {
        let mut headers = HeaderMap::new();
        if let Some(etag) = etag {
            let value = quote_etag(etag);
            headers.insert(
                header::IF_MATCH,
                header::HeaderValue::from_str(&value)
                    .map_err(|e| DavError::validation(e.to_string()))?,
            );
        }
        let response = self.send(Method::DELETE, href, headers, None, cancel).await?;
        if response.is_success() || response.status == 404 {
            Ok(())
        } else {
            Err(DavError::http(
                response.status,
                format!("DELETE failed with HTTP {}", response.status),
            ))
        }
    }

    // ---------------------------------------------------------------
    // sync-collection (RFC 6578, §4.4/§4.6)
    // ---------------------------------------------------------------

    pub async fn sync_collection(
        &self,
        calendar_href: &str,
        token: Option<&str>,
        cancel: &CancelToken,
    ) -> DavResult<SyncResult> {
        let include_data = !self.quirks.sync_collection_omits_added_data;
        let body = build_sync_collection_body(token, None, include_data, self.query_prefix());
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::One.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"REPORT").expect("valid method token"),
                calendar_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;

        if !response.is_success() {
            if self.quirks.is_invalid_sync_token_status(response.status) {
                debug!(
                    status = response.status,
                    "sync-collection token invalidated by provider"
                );
            }
            return Err(DavError::http(
                response.status,
                format!("REPORT sync-collection failed with HTTP {}", response.status),
            ));
        }

        let ms = parse_multistatus(response.body_str()?)?;
        let result = interpret_sync_collection(ms);
        Ok(SyncResult {
            added: result
                .changed_with_data
                .into_iter()
                .map(|r| EventWithMetadata {
                    href: r.href,
                    etag: r.etag.map(|e| unquote_etag(&e)),
                    raw_ical: r.calendar_data,
                })
                .collect(),
            deleted: result.deleted,
            new_sync_token: result.sync_token,
            added_hrefs: result
                .added_hrefs
                .into_iter()
                .map(|(href, etag)| EtagEntry {
                    href,
                    etag: etag.map(|e| unquote_etag(&e)),
                })
                .collect(),
        })
    }

    /// `Ok(None)` when the server advertises no `sync-collection` support,
    /// sparing callers a round-trip destined to fail.
    pub async fn sync_collection_if_supported(
        &self,
        calendar_href: &str,
        token: Option<&str>,
        cancel: &CancelToken,
    ) -> DavResult<Option<SyncResult>> {
        let caps = self.get_capabilities(calendar_href, false, cancel).await?;
        if !caps.supports_sync_collection() {
            return Ok(None);
        }
        self.sync_collection(calendar_href, token, cancel)
            .await
            .map(Some)
    }

    // ---------------------------------------------------------------
    // Collection management
    // ---------------------------------------------------------------

    pub async fn mkcalendar(
        &self,
        href: &str,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
        cancel: &CancelToken,
    ) -> DavResult<()> {
        let extended = self.quirks.supports_extended_mkcol_override;
        let body = build_mkcalendar_body(name, description, color, extended);
        let method = if extended {
            Method::from_bytes(b"MKCOL").expect("valid method token")
        } else {
            Method::from_bytes(b"MKCALENDAR").expect("valid method token")
        };
        let response = self.send(method, href, HeaderMap::new(), Some(body.into()), cancel).await?;
        Self::require_success(response, "MKCALENDAR")?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // ACL (RFC 3744)
    // ---------------------------------------------------------------

    pub async fn get_acl(&self, href: &str, cancel: &CancelToken) -> DavResult<Acl> {
        let body = build_propfind_body(&["D:acl"], PrefixCase::Upper);
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::Zero.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("valid method token"),
                href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "PROPFIND acl")?;
        Ok(parse_acl(response.body_str()?)?)
    }

    pub async fn set_acl(&self, href: &str, aces: &[Ace], cancel: &CancelToken) -> DavResult<()> {
        let body = build_acl_body(aces)?;
        let response = self
            .send(
                Method::from_bytes(b"ACL").expect("valid method token"),
                href,
                HeaderMap::new(),
                Some(body.into()),
                cancel,
            )
            .await?;
        Self::require_success(response, "ACL")?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Scheduling (RFC 6638)
    // ---------------------------------------------------------------

    pub async fn discover_scheduling_urls(
        &self,
        principal_href: &str,
        cancel: &CancelToken,
    ) -> DavResult<SchedulingUrls> {
        let body = build_propfind_body(
            &["C:schedule-inbox-URL", "C:schedule-outbox-URL"],
            PrefixCase::Upper,
        );
        let mut headers = HeaderMap::new();
        headers.insert("Depth", header::HeaderValue::from_static(Depth::Zero.as_str()));
        let response = self
            .send(
                Method::from_bytes(b"PROPFIND").expect("valid method token"),
                principal_href,
                headers,
                Some(body.into()),
                cancel,
            )
            .await?;
        let response = Self::require_success(response, "PROPFIND scheduling urls")?;
        let ms = parse_multistatus(response.body_str()?)?;
        let inbox = ms
            .responses
            .iter()
            .find_map(|r| r.properties.get("schedule-inbox-url").map(str::to_string));
        let outbox = ms
            .responses
            .iter()
            .find_map(|r| r.properties.get("schedule-outbox-url").map(str::to_string));
        Ok(SchedulingUrls { inbox, outbox })
    }

    pub async fn send_scheduling_message(
        &self,
        outbox: &str,
        itip: &str,
        recipients: &[String],
        cancel: &CancelToken,
    ) -> DavResult<SchedulingResult> {
        for r in recipients {
            validate_url_safe(r)?;
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Type",
            header::HeaderValue::from_static("text/calendar; charset=utf-8"),
        );
        if let Some(first) = recipients.first() {
            headers.insert(
                "Originator",
                header::HeaderValue::from_str(first)
                    .map_err(|e| DavError::validation(e.to_string()))?,
            );
        }
        for recipient in recipients {
            headers.append(
                "Recipient",
                header::HeaderValue::from_str(recipient)
                    .map_err(|e| DavError::validation(e.to_string()))?,
            );
        }
        let response = self
            .send(Method::POST, outbox, headers, Some(itip.to_string().into()), cancel)
            .await?;
        let response = Self::require_success(response, "POST scheduling message")?;
        let responses = parse_schedule_responses(response.body_str()?)?;
        Ok(SchedulingResult { responses })
    }

    pub async fn query_free_busy(
        &self,
        outbox: &str,
        organizer: &str,
        attendees: &[String],
        range: (Instant, Instant),
        cancel: &CancelToken,
    ) -> DavResult<Vec<FreeBusyResult>> {
        validate_url_safe(organizer)?;
        for a in attendees {
            validate_url_safe(a)?;
        }
        let body = build_free_busy_query_body(
            &format_timerange_instant(range.0),
            &format_timerange_instant(range.1),
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            "Originator",
            header::HeaderValue::from_str(organizer)
                .map_err(|e| DavError::validation(e.to_string()))?,
        );
        for attendee in attendees {
            headers.append(
                "Recipient",
                header::HeaderValue::from_str(attendee)
                    .map_err(|e| DavError::validation(e.to_string()))?,
            );
        }
        let response = self
            .send(Method::POST, outbox, headers, Some(body.into()), cancel)
            .await?;
        let response = Self::require_success(response, "POST free-busy-query")?;
        let responses = parse_schedule_responses(response.body_str()?)?;
        Ok(responses
            .into_iter()
            .map(|r| FreeBusyResult {
                attendee: r.recipient,
                calendar_data: r.calendar_data,
            })
            .collect())
    }
}

/// Parse a `schedule-response` body (the counterpart of
/// `dav::xml::build_schedule_response_body`) into per-recipient results.
fn parse_schedule_responses(body: &str) -> DavResult<Vec<ScheduleRecipientResponse>> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    fn local_name(raw: &[u8]) -> String {
        let local = match raw.iter().position(|b| *b == b':') {
            Some(idx) => &raw[idx + 1..],
            None => raw,
        };
        String::from_utf8_lossy(local).to_ascii_lowercase()
    }

    let mut xml = Reader::from_str(body);
    xml.config_mut().trim_text(true);
    let mut out = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut recipient = String::new();
    let mut request_status = String::new();
    let mut calendar_data: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "response" {
                    recipient.clear();
                    request_status.clear();
                    calendar_data = None;
                }
                stack.push(name);
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| DavError::parse(e.to_string(), String::new()))?;
                match stack.last().map(String::as_str) {
                    Some("href") => recipient.push_str(text.trim()),
                    Some("request-status") => request_status.push_str(text.trim()),
                    _ => {}
                }
            }
            Ok(Event::CData(e)) => {
                if stack.last().map(String::as_str) == Some("calendar-data") {
                    calendar_data = Some(String::from_utf8_lossy(e.as_ref()).into_owned());
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "response" {
                    out.push(ScheduleRecipientResponse {
                        recipient: std::mem::take(&mut recipient),
                        request_status: std::mem::take(&mut request_status),
                        calendar_data: calendar_data.take(),
                    });
                }
                stack.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DavError::parse(e.to_string(), String::new())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
