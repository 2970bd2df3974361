//! iCalendar (RFC 5545) codec, recurrence engine, and CalDAV (RFC 4791/6578)
//! client core, built on hyper 1.x + rustls.
//!
//! This crate is the *core*: parsing and generating iCalendar data, expanding
//! recurrence rules, speaking the CalDAV/WebDAV wire protocol, and
//! reconciling local and remote calendar state. It does not own persistent
//! storage, a CLI, OAuth token acquisition, or a logging backend — those are
//! left to the embedding application; the crate emits `tracing` events but
//! never installs a subscriber.
//!
//! # Layout
//!
//! - [`ical`] — line folding/escaping, the typed event/todo/journal model,
//!   parsing and generation.
//! - [`recurrence`] — `RRULE ∪ RDATE − EXDATE` expansion, layered on the
//!   `rrule` crate.
//! - [`dav`] — WebDAV/CalDAV XML request builders, the streaming multistatus
//!   parser, ACL decoding, capability parsing.
//! - [`client`] — the high-level [`client::CalDavClient`]: discovery, CRUD,
//!   calendar-query/multiget, sync-collection, ACL, scheduling.
//! - [`sync`] — offline pull/push reconciliation against a
//!   [`client::CalDavClient`].
//! - [`quirks`] — per-provider deviations from the RFCs (iCloud, Nextcloud,
//!   Baikal, Radicale).
//! - [`capabilities_cache`] — the bounded, TTL'd `OPTIONS` capability cache.
//! - [`transport`] — the pluggable [`transport::HttpTransport`] seam and its
//!   production `hyper` implementation.
//! - [`config`] — timeouts, response size cap, cache and recurrence bounds.
//! - [`error`] — the [`error::DavError`]/[`error::DavResult`] taxonomy every
//!   public entry point returns.
//!
//! # Example
//!
//! ```no_run
//! use icaldav::client::CalDavClient;
//! use icaldav::config::ClientConfig;
//! use icaldav::transport::{AuthProvider, BasicAuth, CancelToken};
//! use std::sync::Arc;
//!
//! # async fn run() -> icaldav::error::DavResult<()> {
//! let auth: Arc<dyn AuthProvider> = Arc::new(BasicAuth::new("user", "pass"));
//! let client = CalDavClient::new("https://caldav.example.com/", auth, ClientConfig::default())?;
//! let cancel = CancelToken::new();
//! let account = client.discover_account(&cancel).await?;
//! for calendar in &account.calendars {
//!     let events = client.fetch_events(&calendar.href, None, None, &cancel).await?;
//!     println!("{}: {} events", calendar.href, events.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod capabilities_cache;
pub mod client;
pub mod common;
pub mod config;
pub mod dav;
pub mod error;
pub mod ical;
pub mod quirks;
pub mod recurrence;
pub mod sync;
pub mod transport;

pub use client::CalDavClient;
pub use error::{DavError, DavResult};
pub use quirks::Quirks;
