//! Ambient client configuration: timeouts, response size cap, user agent,
//! and the resource bounds the recurrence engine and capabilities cache
//! enforce independently of any single request.

use std::time::Duration;

/// Default response size cap (10 MB) — protects against a hostile or
/// misbehaving server streaming an unbounded body.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Recommended recurrence iteration cap per `expand()` call.
pub const DEFAULT_RECURRENCE_ITERATION_CAP: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_response_bytes: u64,
    pub capabilities_cache: CapabilitiesCacheConfig,
    pub recurrence: RecurrenceConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("iCalDAV/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            capabilities_cache: CapabilitiesCacheConfig::default(),
            recurrence: RecurrenceConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilitiesCacheConfig {
    pub ttl: Duration,
    pub max_entries: u64,
}

impl Default for CapabilitiesCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecurrenceConfig {
    pub iteration_cap: usize,
    pub wall_clock_budget: Duration,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            iteration_cap: DEFAULT_RECURRENCE_ITERATION_CAP,
            wall_clock_budget: Duration::from_secs(3),
        }
    }
}
