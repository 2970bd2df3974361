//! Integration-style unit tests that exercise more than one module at once
//! (codec round-trips, recurrence-over-parsed-events, sync coalescing with
//! conflict resolution) — properties that don't fit naturally inside a
//! single `#[cfg(test)]` block.

mod ical_roundtrip;
mod recurrence_overrides;
mod sync_reconciliation;
mod uid_safety;
