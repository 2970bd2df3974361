//! iCalendar (RFC 5545) value types.
//!
//! These are plain value types: produced by the parser or by an application,
//! immutable once built (an update is a new copy), and held only as long as
//! the caller holds them. There is no registry or interning anywhere here.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// An absolute UTC moment with millisecond resolution.
pub type Instant = DateTime<Utc>;

/// A date-time as it appeared on the wire: either UTC, zone-qualified, or
/// floating (no zone, interpreted in the viewer's local zone), and possibly
/// a bare `VALUE=DATE` with no time-of-day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ICalDateTime {
    pub timestamp: Instant,
    pub timezone: Option<String>,
    pub is_utc: bool,
    pub is_date: bool,
}

impl ICalDateTime {
    pub fn utc(timestamp: Instant) -> Self {
        Self {
            timestamp,
            timezone: None,
            is_utc: true,
            is_date: false,
        }
    }

    pub fn floating(timestamp: Instant, timezone: Option<String>) -> Self {
        Self {
            timestamp,
            timezone,
            is_utc: false,
            is_date: false,
        }
    }

    pub fn date_only(timestamp: Instant) -> Self {
        Self {
            timestamp,
            timezone: None,
            is_utc: false,
            is_date: true,
        }
    }

    /// Day-code (`YYYYMMDD`) of this instant in its declared zone, used to key
    /// overrides and to compare RDATE/EXDATE/RRULE instants for equality.
    pub fn day_code(&self) -> String {
        self.timestamp.format("%Y%m%d").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Public,
    Private,
    Confidential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Tentative,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoStatus {
    NeedsAction,
    InProcess,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalStatus {
    Draft,
    Final,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weekday {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

/// `{±n?}{MO..SU}` — an ordinal weekday reference used in `BYDAY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByDay {
    pub ordinal: Option<i32>,
    pub weekday: Weekday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RRule {
    pub freq: Frequency,
    pub interval: u32,
    pub count: Option<i64>,
    pub until: Option<ICalDateTime>,
    pub by_second: Vec<u8>,
    pub by_minute: Vec<u8>,
    pub by_hour: Vec<u8>,
    pub by_day: Vec<ByDay>,
    pub by_monthday: Vec<i8>,
    pub by_yearday: Vec<i16>,
    pub by_weekno: Vec<i8>,
    pub by_month: Vec<u8>,
    pub by_setpos: Vec<i32>,
    pub wkst: Weekday,
}

impl Default for RRule {
    fn default() -> Self {
        Self {
            freq: Frequency::Daily,
            interval: 1,
            count: None,
            until: None,
            by_second: Vec::new(),
            by_minute: Vec::new(),
            by_hour: Vec::new(),
            by_day: Vec::new(),
            by_monthday: Vec::new(),
            by_yearday: Vec::new(),
            by_weekno: Vec::new(),
            by_month: Vec::new(),
            by_setpos: Vec::new(),
            wkst: Weekday::Mo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmAction {
    Audio,
    Display,
    Email,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmTrigger {
    /// Relative to `DTSTART` (or `DTEND` when `related_end` is set).
    Relative {
        duration: chrono::Duration,
        related_end: bool,
    },
    Absolute(ICalDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub action: AlarmAction,
    pub action_raw: Option<String>,
    pub trigger: AlarmTrigger,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub attendees: Vec<String>,
    pub repeat: Option<u32>,
    pub duration: Option<chrono::Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organizer {
    pub cn: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendeeRole {
    Chair,
    ReqParticipant,
    OptParticipant,
    NonParticipant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStat {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuType {
    Individual,
    Group,
    Resource,
    Room,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub cn: Option<String>,
    pub email: String,
    pub role: Option<AttendeeRole>,
    pub partstat: Option<PartStat>,
    pub rsvp: Option<bool>,
    pub cutype: Option<CuType>,
}

/// One verbatim unknown or `X-`-prefixed property exactly as seen on the
/// wire: its name, parameters (order preserved, each possibly multi-valued),
/// and value.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProperty {
    pub name: String,
    pub params: Vec<(String, Vec<String>)>,
    pub value: String,
}

/// Unknown and `X-` properties, preserved verbatim and insertion-ordered
/// for round-trip fidelity. A `Vec` rather than a map: two properties that
/// share a name (repeated `X-` extensions, or any unknown property that
/// legally recurs) must not collapse into one on `parse(generate(e))`.
pub type RawProperties = Vec<RawProperty>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEnd {
    DtEnd(ICalDateTime),
    Duration(chrono::Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ICalEvent {
    pub uid: String,
    pub import_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub dtstart: ICalDateTime,
    pub end: Option<EventEnd>,
    pub is_all_day: bool,
    pub status: Option<EventStatus>,
    pub classification: Option<Classification>,
    pub transparency: Transparency,
    pub sequence: u32,
    pub rrule: Option<RRule>,
    pub rdates: Vec<ICalDateTime>,
    pub exdates: Vec<ICalDateTime>,
    pub recurrence_id: Option<ICalDateTime>,
    pub alarms: Vec<Alarm>,
    pub categories: Vec<String>,
    pub organizer: Option<Organizer>,
    pub attendees: Vec<Attendee>,
    pub color: Option<String>,
    pub dtstamp: Option<ICalDateTime>,
    pub last_modified: Option<ICalDateTime>,
    pub created: Option<ICalDateTime>,
    pub url: Option<String>,
    pub raw_properties: RawProperties,
}

impl ICalEvent {
    /// `recurrence_id` implies this event is itself an override, which
    /// cannot simultaneously define its own recurrence set.
    pub fn is_override(&self) -> bool {
        self.recurrence_id.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some() || !self.rdates.is_empty()
    }

    /// `uid|RECID|<recurrence-id-daycode>` for an override, else the bare
    /// uid for a master event — the ordered key `import_id` described in
    /// the data model.
    pub fn compute_import_id(uid: &str, recurrence_id: Option<&ICalDateTime>) -> String {
        match recurrence_id {
            Some(rid) => format!("{uid}|RECID|{}", rid.day_code()),
            None => uid.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ICalTodo {
    pub uid: String,
    pub import_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub dtstart: Option<ICalDateTime>,
    pub due: Option<ICalDateTime>,
    pub completed: Option<ICalDateTime>,
    pub status: Option<TodoStatus>,
    pub classification: Option<Classification>,
    pub sequence: u32,
    pub rrule: Option<RRule>,
    pub rdates: Vec<ICalDateTime>,
    pub exdates: Vec<ICalDateTime>,
    pub recurrence_id: Option<ICalDateTime>,
    pub alarms: Vec<Alarm>,
    pub categories: Vec<String>,
    pub organizer: Option<Organizer>,
    pub attendees: Vec<Attendee>,
    pub dtstamp: Option<ICalDateTime>,
    pub last_modified: Option<ICalDateTime>,
    pub created: Option<ICalDateTime>,
    pub percent_complete: Option<u8>,
    pub raw_properties: RawProperties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ICalJournal {
    pub uid: String,
    pub import_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub dtstart: Option<ICalDateTime>,
    pub status: Option<JournalStatus>,
    pub classification: Option<Classification>,
    pub sequence: u32,
    pub recurrence_id: Option<ICalDateTime>,
    pub categories: Vec<String>,
    pub organizer: Option<Organizer>,
    pub dtstamp: Option<ICalDateTime>,
    pub last_modified: Option<ICalDateTime>,
    pub created: Option<ICalDateTime>,
    pub raw_properties: RawProperties,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ICalCalendar {
    pub prod_id: String,
    pub version: String,
    pub events: Vec<ICalEvent>,
    pub todos: Vec<ICalTodo>,
    pub journals: Vec<ICalJournal>,
    /// Raw `VTIMEZONE` blocks keyed by `TZID`, preserved opaquely for
    /// round-trip fidelity — timezone arithmetic goes through `chrono-tz`.
    pub timezones: BTreeMap<String, String>,
}
