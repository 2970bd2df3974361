//! Recurrence set expansion layered on top of the `rrule` crate.

pub mod engine;
pub mod overrides;

pub use engine::{TimeRange, expand};
pub use overrides::build_override_map;
