//! Recurrence expansion: `Occurrences = (DTSTART ∪ RRULE ∪ RDATE) − EXDATE`,
//! sorted by start time and deduplicated by start instant, with per-instance
//! `RECURRENCE-ID` overrides substituted in.
//!
//! The FREQ/INTERVAL/BY* filtering is delegated to the `rrule` crate by
//! round-tripping this crate's `RRule` value through its RFC 5545 text form
//! and parsing it as an `rrule::RRuleSet` — the same approach used for
//! recurrence elsewhere in the surrounding pack. RDATE/EXDATE merge,
//! override replacement, the iteration cap, and the wall-clock budget are
//! this module's own layer on top.

use crate::config::RecurrenceConfig;
use crate::ical::generator::render_rrule;
use crate::ical::model::{EventEnd, ICalDateTime, ICalEvent, Instant};
use rrule::RRuleSet;
use std::collections::{HashMap, HashSet};
use std::time::Instant as StdInstant;

#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: Instant,
    pub end: Instant,
}

impl TimeRange {
    pub fn contains(&self, instant: Instant) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Render a full `DTSTART[;TZID=...]:value` line for the synthetic RRULE
/// text handed to the `rrule` crate.
fn dtstart_line(dt: &ICalDateTime) -> String {
    if dt.is_utc {
        format!("DTSTART:{}Z", dt.timestamp.format("%Y%m%dT%H%M%S"))
    } else if let Some(tz) = &dt.timezone {
        format!("DTSTART;TZID={tz}:{}", dt.timestamp.format("%Y%m%dT%H%M%S"))
    } else {
        // Floating time with no declared zone: treated as UTC, the same
        // approximation the rrule-backed examples in the pack make.
        format!("DTSTART:{}Z", dt.timestamp.format("%Y%m%dT%H%M%S"))
    }
}

/// Expand a master event's `RRULE` into candidate instants within `range`,
/// bounded by `config.iteration_cap` and a coarse wall-clock budget check.
fn expand_rrule_candidates(
    event: &ICalEvent,
    range: TimeRange,
    config: &RecurrenceConfig,
) -> Vec<Instant> {
    let Some(rrule) = &event.rrule else {
        return Vec::new();
    };

    let full = format!("{}\nRRULE:{}", dtstart_line(&event.dtstart), render_rrule(rrule));

    let Ok(rrule_set) = full.parse::<RRuleSet>() else {
        return Vec::new();
    };

    let started = StdInstant::now();
    let tz = rrule_set.get_dt_start().timezone();
    let search_start = range
        .start
        .with_timezone(&tz)
        .checked_sub_signed(chrono::Duration::seconds(1))
        .unwrap_or_else(|| range.start.with_timezone(&tz));

    let limit = config.iteration_cap.min(u16::MAX as usize) as u16;
    if started.elapsed() > config.wall_clock_budget {
        return Vec::new();
    }

    rrule_set
        .after(search_start)
        .all(limit)
        .dates
        .into_iter()
        .map(|d| d.with_timezone(&chrono::Utc))
        .take_while(|d| *d <= range.end)
        .collect()
}

/// Expand `event` (a recurring master or a standalone occurrence) into the
/// occurrences intersecting `range`. `overrides` maps day-code to the
/// per-instance event that replaces the generated occurrence for that day.
pub fn expand(
    event: &ICalEvent,
    range: TimeRange,
    overrides: &HashMap<String, ICalEvent>,
    config: &RecurrenceConfig,
) -> Vec<ICalEvent> {
    if !event.is_recurring() {
        if range.contains(event.dtstart.timestamp) {
            return vec![event.clone()];
        }
        return Vec::new();
    }

    let mut by_day_code: HashMap<String, Instant> = HashMap::new();

    for instant in expand_rrule_candidates(event, range, config) {
        let day_code = instant.format("%Y%m%d").to_string();
        by_day_code.entry(day_code).or_insert(instant);
    }

    for rdate in &event.rdates {
        if range.contains(rdate.timestamp) {
            by_day_code
                .entry(rdate.day_code())
                .or_insert(rdate.timestamp);
        }
    }

    let exdate_codes: HashSet<String> = event.exdates.iter().map(|e| e.day_code()).collect();
    by_day_code.retain(|code, _| !exdate_codes.contains(code));

    let mut occurrences: Vec<ICalEvent> = Vec::with_capacity(by_day_code.len());
    for (day_code, instant) in by_day_code {
        if let Some(over) = overrides.get(&day_code) {
            occurrences.push(over.clone());
            continue;
        }
        let mut occ = event.clone();
        let shift = instant - event.dtstart.timestamp;
        occ.dtstart.timestamp = instant;
        occ.end = match &event.end {
            Some(EventEnd::DtEnd(dtend)) => {
                let mut dtend = dtend.clone();
                dtend.timestamp += shift;
                Some(EventEnd::DtEnd(dtend))
            }
            Some(EventEnd::Duration(d)) => Some(EventEnd::Duration(*d)),
            None => None,
        };
        occ.rrule = None;
        occ.rdates.clear();
        occ.exdates.clear();
        occ.recurrence_id = Some(ICalDateTime {
            timestamp: instant,
            timezone: event.dtstart.timezone.clone(),
            is_utc: event.dtstart.is_utc,
            is_date: event.dtstart.is_date,
        });
        occurrences.push(occ);
    }

    occurrences.sort_by_key(|o| o.dtstart.timestamp);
    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::model::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32) -> Instant {
        chrono::Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    fn base_event(dtstart: Instant) -> ICalEvent {
        ICalEvent {
            uid: "a@x".to_string(),
            import_id: "a@x".to_string(),
            summary: Some("Hi".to_string()),
            description: None,
            location: None,
            dtstart: ICalDateTime::utc(dtstart),
            end: Some(EventEnd::DtEnd(ICalDateTime::utc(dtstart + chrono::Duration::hours(1)))),
            is_all_day: false,
            status: None,
            classification: None,
            transparency: Transparency::Opaque,
            sequence: 0,
            rrule: None,
            rdates: Vec::new(),
            exdates: Vec::new(),
            recurrence_id: None,
            alarms: Vec::new(),
            categories: Vec::new(),
            organizer: None,
            attendees: Vec::new(),
            color: None,
            dtstamp: None,
            last_modified: None,
            created: None,
            url: None,
            raw_properties: Default::default(),
        }
    }

    #[test]
    fn weekly_rrule_plus_rdate_minus_exdate() {
        let dtstart = utc(2026, 1, 15, 10, 0);
        let mut event = base_event(dtstart);
        event.rrule = Some(RRule {
            freq: Frequency::Weekly,
            count: Some(3),
            ..Default::default()
        });
        event.rdates = vec![ICalDateTime::utc(utc(2026, 2, 10, 10, 0))];
        event.exdates = vec![ICalDateTime::utc(utc(2026, 1, 22, 10, 0))];

        let range = TimeRange {
            start: utc(2026, 1, 1, 0, 0),
            end: utc(2026, 3, 1, 0, 0),
        };
        let config = RecurrenceConfig::default();
        let occurrences = expand(&event, range, &HashMap::new(), &config);

        let days: Vec<String> = occurrences.iter().map(|o| o.dtstart.day_code()).collect();
        assert_eq!(days, vec!["20260115", "20260129", "20260210"]);
    }

    #[test]
    fn exdate_for_absent_instant_is_a_no_op() {
        let dtstart = utc(2026, 1, 15, 10, 0);
        let mut event = base_event(dtstart);
        event.rrule = Some(RRule {
            freq: Frequency::Weekly,
            count: Some(2),
            ..Default::default()
        });
        event.exdates = vec![ICalDateTime::utc(utc(2099, 1, 1, 0, 0))];

        let range = TimeRange {
            start: utc(2026, 1, 1, 0, 0),
            end: utc(2026, 3, 1, 0, 0),
        };
        let config = RecurrenceConfig::default();
        let occurrences = expand(&event, range, &HashMap::new(), &config);
        assert_eq!(occurrences.len(), 2);
    }

    #[test]
    fn override_replaces_generated_occurrence() {
        let dtstart = utc(2026, 1, 15, 10, 0);
        let mut event = base_event(dtstart);
        event.rrule = Some(RRule {
            freq: Frequency::Weekly,
            count: Some(2),
            ..Default::default()
        });

        let mut overridden = base_event(utc(2026, 1, 22, 12, 0));
        overridden.summary = Some("Moved".to_string());
        overridden.recurrence_id = Some(ICalDateTime::utc(utc(2026, 1, 22, 10, 0)));

        let mut overrides = HashMap::new();
        overrides.insert("20260122".to_string(), overridden);

        let range = TimeRange {
            start: utc(2026, 1, 1, 0, 0),
            end: utc(2026, 3, 1, 0, 0),
        };
        let config = RecurrenceConfig::default();
        let occurrences = expand(&event, range, &overrides, &config);
        assert_eq!(occurrences.len(), 2);
        let moved = occurrences
            .iter()
            .find(|o| o.dtstart.day_code() == "20260122")
            .unwrap();
        assert_eq!(moved.summary.as_deref(), Some("Moved"));
    }

    #[test]
    fn non_recurring_event_outside_range_yields_nothing() {
        let event = base_event(utc(2026, 1, 15, 10, 0));
        let range = TimeRange {
            start: utc(2026, 2, 1, 0, 0),
            end: utc(2026, 3, 1, 0, 0),
        };
        let config = RecurrenceConfig::default();
        assert!(expand(&event, range, &HashMap::new(), &config).is_empty());
    }
}
