//! Override map construction: `RECURRENCE-ID` events keyed by day-code.

use crate::ical::model::ICalEvent;
use std::collections::HashMap;

/// Build an override mapping from a sequence of events. Events without a
/// `recurrence_id` are excluded; each override is keyed by the day-code of
/// its `recurrence_id` in its own declared zone.
pub fn build_override_map(events: &[ICalEvent]) -> HashMap<String, ICalEvent> {
    events
        .iter()
        .filter_map(|e| {
            e.recurrence_id
                .as_ref()
                .map(|rid| (rid.day_code(), e.clone()))
        })
        .collect()
}
