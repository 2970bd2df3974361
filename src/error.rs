//! The error taxonomy every public entry point surfaces through.
//!
//! `spec.md` §3/§7 describe `DavResult<T>` as a tagged value:
//! `Success(T) | HttpError | NetworkError | ParseError`, plus `Conflict` and
//! `ValidationError` introduced by the sync engine and input validation. The
//! idiomatic Rust rendering is `Result<T, DavError>` — `Ok(v)` *is*
//! `Success(v)`, and `DavError`'s variants are the remaining tags. Every
//! public entry point returns `DavResult<T>`; nothing in this crate panics or
//! throws across its public boundary.

use crate::dav::model::EventWithMetadata;
use std::fmt;

pub type DavResult<T> = Result<T, DavError>;

/// The cause of a [`DavError::Network`] failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkCause {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("read timed out")]
    ReadTimeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DavError {
    /// The server answered with a non-2xx HTTP status.
    #[error("HTTP {code}: {message}")]
    Http { code: u16, message: String },

    /// Transport-level failure: connect/read/timeout/cancellation.
    #[error("network error: {cause}")]
    Network { cause: NetworkCause },

    /// A response body (iCalendar or XML) failed to parse.
    #[error("parse error: {message}")]
    Parse { message: String, snippet: String },

    /// A `412 Precondition Failed` reinterpreted by the sync engine.
    #[error("conflict on {}", .local.href)]
    Conflict {
        local: Box<EventWithMetadata>,
        remote: Box<EventWithMetadata>,
    },

    /// Caller-supplied input failed a pre-condition (e.g. a blank UID).
    #[error("validation error: {message}")]
    Validation { message: String },
}

impl DavError {
    pub fn http(code: u16, message: impl Into<String>) -> Self {
        DavError::Http {
            code,
            message: message.into(),
        }
    }

    pub fn network(cause: NetworkCause) -> Self {
        DavError::Network { cause }
    }

    pub fn parse(message: impl Into<String>, snippet: impl Into<String>) -> Self {
        DavError::Parse {
            message: message.into(),
            snippet: snippet.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DavError::Validation {
            message: message.into(),
        }
    }

    /// `412`, `401`/`403`, `410`, `5xx` behave differently per §7; this
    /// reports whether the *transport-level* condition is worth retrying.
    /// `412` conflicts and `4xx` validation failures are not retriable; `5xx`
    /// and network errors (barring cancellation) are.
    pub fn is_retriable(&self) -> bool {
        match self {
            DavError::Http { code, .. } => *code >= 500,
            DavError::Network { cause } => !matches!(cause, NetworkCause::Cancelled),
            DavError::Parse { .. } | DavError::Conflict { .. } | DavError::Validation { .. } => {
                false
            }
        }
    }

    /// Whether this HTTP error is the well-known `412 Precondition Failed`
    /// optimistic-concurrency conflict.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, DavError::Http { code: 412, .. })
    }
}

impl From<crate::ical::IcalError> for DavError {
    fn from(e: crate::ical::IcalError) -> Self {
        DavError::parse(e.to_string(), String::new())
    }
}

impl From<crate::dav::xml::DavXmlError> for DavError {
    fn from(e: crate::dav::xml::DavXmlError) -> Self {
        DavError::parse(e.to_string(), String::new())
    }
}

impl From<crate::dav::multistatus::MultistatusError> for DavError {
    fn from(e: crate::dav::multistatus::MultistatusError) -> Self {
        DavError::parse(e.to_string(), String::new())
    }
}

impl From<crate::dav::acl::AclParseError> for DavError {
    fn from(e: crate::dav::acl::AclParseError) -> Self {
        DavError::parse(e.to_string(), String::new())
    }
}

/// Non-fatal observations collected while parsing a permissive format, e.g.
/// `VALUE=PERIOD` RDATEs skipped per §4.1, or individual components in a
/// multi-event stream that failed without aborting the whole stream.
#[derive(Debug, Clone, Default)]
pub struct ParseWarnings {
    pub skipped_periods: Vec<String>,
    pub failed_components: Vec<ComponentParseFailure>,
}

#[derive(Debug, Clone)]
pub struct ComponentParseFailure {
    pub component: String,
    pub message: String,
}

impl fmt::Display for ComponentParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.component, self.message)
    }
}
