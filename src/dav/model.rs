//! WebDAV/CalDAV response shapes shared across the DAV codec and client.

use std::collections::{BTreeSet, HashMap};

/// Pairs a parsed calendar entity with the server coordinates a conditional
/// update needs. `event` is left as the raw iCalendar text here — the
/// client layer decides whether and how to parse it, so this type has no
/// dependency on the `ical` module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventWithMetadata {
    pub href: String,
    pub etag: Option<String>,
    pub raw_ical: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyStatus {
    pub code: u16,
    pub text: String,
}

/// Property local name → value, with a parallel per-property status so
/// callers can distinguish a `200` property from a `404`/`403` one without
/// losing the rest of the response.
#[derive(Debug, Clone, Default)]
pub struct DavProperties {
    pub values: HashMap<String, String>,
    pub statuses: HashMap<String, PropertyStatus>,
}

impl DavProperties {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }

    /// Properties present in some `propstat` block with a non-2xx status.
    pub fn failed_properties(&self) -> Vec<(&str, &PropertyStatus)> {
        self.statuses
            .iter()
            .filter(|(_, s)| !(200..300).contains(&s.code))
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DavResponse {
    pub href: String,
    pub status: Option<u16>,
    pub properties: DavProperties,
    pub etag: Option<String>,
    pub calendar_data: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MultiStatus {
    pub responses: Vec<DavResponse>,
    pub sync_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerCapabilities {
    pub dav_classes: BTreeSet<String>,
    pub allowed_methods: BTreeSet<String>,
    pub raw_dav_header: String,
    pub discovered_at: chrono::DateTime<chrono::Utc>,
}

impl ServerCapabilities {
    pub fn supports_caldav(&self) -> bool {
        self.dav_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case("calendar-access"))
    }

    pub fn supports_sync_collection(&self) -> bool {
        self.dav_classes.contains("3") || self.dav_classes.contains("sync-collection")
    }

    pub fn supports_auto_schedule(&self) -> bool {
        self.dav_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case("calendar-auto-schedule"))
    }

    pub fn supports_acl(&self) -> bool {
        self.dav_classes.iter().any(|c| c.eq_ignore_ascii_case("access-control"))
    }

    pub fn supports_mkcalendar(&self) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case("MKCALENDAR"))
    }

    pub fn supports_extended_mkcol(&self) -> bool {
        self.dav_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case("extended-mkcol"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    Href(String),
    All,
    Authenticated,
    Unauthenticated,
    SelfPrincipal,
    Property(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Privilege {
    Read,
    Write,
    WriteProperties,
    WriteContent,
    Unlock,
    ReadAcl,
    WriteAcl,
    ReadCurrentUserPrivilegeSet,
    Bind,
    Unbind,
    All,
}

#[derive(Debug, Clone)]
pub struct Ace {
    pub principal: Principal,
    pub grant: BTreeSet<Privilege>,
    pub deny: BTreeSet<Privilege>,
    pub inherited: Option<String>,
}

impl Ace {
    /// An ACE granting `all` implicitly grants every other privilege.
    pub fn grants(&self, privilege: Privilege) -> bool {
        self.grant.contains(&Privilege::All) || self.grant.contains(&privilege)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Acl {
    pub aces: Vec<Ace>,
}
