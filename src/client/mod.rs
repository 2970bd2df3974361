//! The high-level client (§4.4): discovery, CRUD, querying, sync-collection,
//! ACL and scheduling, plus the URL-safety helpers the client leans on.

pub mod caldav_client;
pub mod types;
pub mod uid;

pub use caldav_client::CalDavClient;
pub use types::{
    Account, CalendarListing, EtagEntry, FreeBusyResult, SchedulingResult, SchedulingUrls,
    SyncResult,
};
pub use uid::{build_event_url, sanitize_uid};
