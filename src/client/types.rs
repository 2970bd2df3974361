//! Result shapes for [`super::caldav_client::CalDavClient`] operations that
//! don't already have a home in `dav::model`.

use crate::dav::model::EventWithMetadata;

/// RFC 6764 discovery result: the current user's principal plus the
/// calendar collections found under their calendar-home-set.
#[derive(Debug, Clone)]
pub struct Account {
    pub principal: String,
    pub calendar_home_set: Vec<String>,
    pub calendars: Vec<CalendarListing>,
}

#[derive(Debug, Clone, Default)]
pub struct CalendarListing {
    pub href: String,
    pub displayname: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub ctag: Option<String>,
    pub sync_token: Option<String>,
    pub supported_components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtagEntry {
    pub href: String,
    pub etag: Option<String>,
}

/// The shape `sync_collection` returns (§4.4): changed resources with their
/// calendar data, hrefs deleted since the token was issued, hrefs that
/// changed but arrived with no `calendar-data` (iCloud quirk — resolve with
/// `fetch_events_by_href`), and the token to persist for the next call.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub added: Vec<EventWithMetadata>,
    pub deleted: Vec<String>,
    pub new_sync_token: Option<String>,
    pub added_hrefs: Vec<EtagEntry>,
}

#[derive(Debug, Clone)]
pub struct SchedulingUrls {
    pub inbox: Option<String>,
    pub outbox: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SchedulingResult {
    pub responses: Vec<crate::dav::xml::ScheduleRecipientResponse>,
}

#[derive(Debug, Clone)]
pub struct FreeBusyResult {
    pub attendee: String,
    pub calendar_data: Option<String>,
}
