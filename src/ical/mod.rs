//! iCalendar (RFC 5545) codec: parsing, generation, escaping, and the
//! typed value model shared by the rest of the crate.

pub mod escape;
pub mod generator;
pub mod model;
pub mod parser;

pub use escape::{escape_text, unescape_text};
pub use generator::{fold_line, generate_calendar, generate_event, render_rrule};
pub use model::*;
pub use parser::{IcalError, parse_calendar_stream, parse_rrule, unfold_lines};
