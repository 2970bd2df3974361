//! The RFC 5545 parser: line unfolding, a recursive-descent component
//! reader, and the property-to-typed-field mapping.
//!
//! Mirrors the client crate's streaming multistatus reader in spirit — a
//! small hand-rolled state machine rather than a grammar library — but
//! works over the already-unfolded logical line sequence since iCalendar's
//! folding rule (unlike XML) is trivial to resolve up front.

use crate::error::{ComponentParseFailure, ParseWarnings};
use crate::ical::escape::unescape_text;
use crate::ical::model::*;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::str::FromStr;

#[derive(Debug, Clone, thiserror::Error)]
pub enum IcalError {
    #[error("unterminated line fold")]
    UnterminatedFold,
    #[error("malformed component nesting in {component}")]
    MalformedNesting { component: String },
    #[error("unterminated quoted parameter value")]
    UnterminatedQuotedParam,
    #[error("invalid date-time value: {value}")]
    InvalidDateTime { value: String },
    #[error("unknown value type for {property}: {value}")]
    UnknownValueType { property: String, value: String },
    #[error("missing required property {property} in {component}")]
    MissingProperty { property: String, component: String },
}

/// Unfold a raw iCalendar byte stream into logical lines. Accepts CRLF or
/// bare LF; a continuation line is any line whose first octet is a space or
/// horizontal tab, which is discarded when the line is joined to its
/// predecessor.
pub fn unfold_lines(raw: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for physical in raw.split('\n') {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);
        if let Some(rest) = physical
            .strip_prefix(' ')
            .or_else(|| physical.strip_prefix('\t'))
        {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(physical.to_string());
    }
    // drop trailing blank lines produced by a final newline
    while matches!(lines.last(), Some(l) if l.is_empty()) {
        lines.pop();
    }
    lines
}

impl RawProperty {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(|s| s.as_str())
    }
}

/// Parse one logical line `NAME(;PARAM=VAL(,VAL)*)*:VALUE` into a
/// [`RawProperty`]. Quoted parameter values may contain `:` and `;`.
pub fn parse_property_line(line: &str) -> Result<RawProperty, IcalError> {
    let bytes = line.as_bytes();
    let mut i = 0;
    let mut name = String::new();
    while i < bytes.len() && bytes[i] != b';' && bytes[i] != b':' {
        name.push(bytes[i] as char);
        i += 1;
    }

    let mut params = Vec::new();
    while i < bytes.len() && bytes[i] == b';' {
        i += 1;
        let mut pname = String::new();
        while i < bytes.len() && bytes[i] != b'=' {
            pname.push(bytes[i] as char);
            i += 1;
        }
        if i < bytes.len() {
            i += 1; // '='
        }
        let mut values = Vec::new();
        loop {
            let mut val = String::new();
            if i < bytes.len() && bytes[i] == b'"' {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(IcalError::UnterminatedQuotedParam);
                }
                val.push_str(&line[start..i]);
                i += 1; // closing quote
            } else {
                let start = i;
                while i < bytes.len() && bytes[i] != b',' && bytes[i] != b';' && bytes[i] != b':' {
                    i += 1;
                }
                val.push_str(&line[start..i]);
            }
            values.push(val);
            if i < bytes.len() && bytes[i] == b',' {
                i += 1;
                continue;
            }
            break;
        }
        params.push((pname, values));
    }

    let value = if i < bytes.len() && bytes[i] == b':' {
        line[i + 1..].to_string()
    } else {
        String::new()
    };

    Ok(RawProperty {
        name,
        params,
        value,
    })
}

#[derive(Debug, Clone)]
pub struct RawComponent {
    pub name: String,
    pub properties: Vec<RawProperty>,
    pub children: Vec<RawComponent>,
}

/// Recursive-descent reader over `BEGIN:X`/`END:X` pairs. An unknown
/// component is still read structurally (so nesting stays balanced) and
/// carried as an opaque [`RawComponent`] for callers that want to preserve
/// it; this crate's typed mapping only promotes the components it knows.
pub fn parse_components(lines: &[String]) -> Result<Vec<RawComponent>, IcalError> {
    let mut idx = 0;
    let mut roots = Vec::new();
    while idx < lines.len() {
        let (component, next) = parse_one_component(lines, idx)?;
        roots.push(component);
        idx = next;
    }
    Ok(roots)
}

fn parse_one_component(lines: &[String], start: usize) -> Result<(RawComponent, usize), IcalError> {
    let prop = parse_property_line(&lines[start])?;
    if !prop.name.eq_ignore_ascii_case("BEGIN") {
        return Err(IcalError::MalformedNesting {
            component: prop.name,
        });
    }
    let name = prop.value.trim().to_ascii_uppercase();
    let mut properties = Vec::new();
    let mut children = Vec::new();
    let mut idx = start + 1;
    loop {
        if idx >= lines.len() {
            return Err(IcalError::MalformedNesting { component: name });
        }
        let line = &lines[idx];
        let p = parse_property_line(line)?;
        if p.name.eq_ignore_ascii_case("END") {
            if !p.value.trim().eq_ignore_ascii_case(&name) {
                return Err(IcalError::MalformedNesting { component: name });
            }
            idx += 1;
            break;
        } else if p.name.eq_ignore_ascii_case("BEGIN") {
            let (child, next) = parse_one_component(lines, idx)?;
            children.push(child);
            idx = next;
        } else {
            properties.push(p);
            idx += 1;
        }
    }
    Ok((
        RawComponent {
            name,
            properties,
            children,
        },
        idx,
    ))
}

fn parse_datetime(prop: &RawProperty) -> Result<ICalDateTime, IcalError> {
    let value = prop.value.trim();
    let is_date_value = prop
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
    let tzid = prop.param("TZID").map(|s| s.to_string());

    if is_date_value || (value.len() == 8 && !value.contains('T')) {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|_| IcalError::InvalidDateTime {
                value: value.to_string(),
            })?;
        let dt = date.and_hms_opt(0, 0, 0).unwrap();
        return Ok(ICalDateTime::date_only(Utc.from_utc_datetime(&dt)));
    }

    if let Some(rest) = value.strip_suffix('Z') {
        let dt = NaiveDateTime::parse_from_str(rest, "%Y%m%dT%H%M%S")
            .map_err(|_| IcalError::InvalidDateTime {
                value: value.to_string(),
            })?;
        return Ok(ICalDateTime::utc(Utc.from_utc_datetime(&dt)));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| {
        IcalError::InvalidDateTime {
            value: value.to_string(),
        }
    })?;

    if let Some(tz_name) = &tzid
        && let Ok(tz) = chrono_tz::Tz::from_str(tz_name)
    {
        let local = tz
            .from_local_datetime(&naive)
            .single()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive));
        return Ok(ICalDateTime::floating(
            local.with_timezone(&Utc),
            Some(tz_name.clone()),
        ));
    }

    Ok(ICalDateTime::floating(Utc.from_utc_datetime(&naive), tzid))
}

fn parse_duration(value: &str) -> Option<chrono::Duration> {
    // ISO 8601 duration subset used by RFC 5545: [+-]P(nW|nD)?(T(nH)?(nM)?(nS)?)?
    let mut s = value.trim();
    let negative = if let Some(rest) = s.strip_prefix('-') {
        s = rest;
        true
    } else {
        s.strip_prefix('+').inspect(|rest| s = rest);
        false
    };
    let s = s.strip_prefix('P')?;
    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (s, None),
    };
    let mut total = chrono::Duration::zero();
    let mut num = String::new();
    for c in date_part.chars() {
        if c.is_ascii_digit() {
            num.push(c);
        } else {
            let n: i64 = num.parse().ok()?;
            num.clear();
            match c {
                'W' => total += chrono::Duration::weeks(n),
                'D' => total += chrono::Duration::days(n),
                _ => return None,
            }
        }
    }
    if let Some(time_part) = time_part {
        let mut num = String::new();
        for c in time_part.chars() {
            if c.is_ascii_digit() {
                num.push(c);
            } else {
                let n: i64 = num.parse().ok()?;
                num.clear();
                match c {
                    'H' => total += chrono::Duration::hours(n),
                    'M' => total += chrono::Duration::minutes(n),
                    'S' => total += chrono::Duration::seconds(n),
                    _ => return None,
                }
            }
        }
    }
    Some(if negative { -total } else { total })
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    Some(match s.to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mo,
        "TU" => Weekday::Tu,
        "WE" => Weekday::We,
        "TH" => Weekday::Th,
        "FR" => Weekday::Fr,
        "SA" => Weekday::Sa,
        "SU" => Weekday::Su,
        _ => return None,
    })
}

/// Parse `RRULE` value content. Invalid parameters are coerced per §4.2
/// rather than rejected: `INTERVAL<=0` becomes `1`, `COUNT<=0` becomes a
/// rule that yields zero occurrences (`count=Some(0)`), and an empty
/// `BYDAY` is left empty (the engine substitutes the master's weekday at
/// expansion time, since this parser has no master dtstart in scope).
pub fn parse_rrule(value: &str) -> RRule {
    let mut rule = RRule::default();
    for part in value.split(';') {
        let Some((key, val)) = part.split_once('=') else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => {
                rule.freq = match val.to_ascii_uppercase().as_str() {
                    "SECONDLY" => Frequency::Secondly,
                    "MINUTELY" => Frequency::Minutely,
                    "HOURLY" => Frequency::Hourly,
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    "YEARLY" => Frequency::Yearly,
                    _ => rule.freq,
                };
            }
            "INTERVAL" => {
                let n: i64 = val.parse().unwrap_or(1);
                rule.interval = if n <= 0 { 1 } else { n as u32 };
            }
            "COUNT" => {
                let n: i64 = val.parse().unwrap_or(0);
                rule.count = Some(if n <= 0 { 0 } else { n });
            }
            "UNTIL" => {
                let prop = RawProperty {
                    name: "UNTIL".to_string(),
                    params: Vec::new(),
                    value: val.to_string(),
                };
                if let Ok(dt) = parse_datetime(&prop) {
                    rule.until = Some(dt);
                }
            }
            "BYSECOND" => rule.by_second = val.split(',').filter_map(|v| v.parse().ok()).collect(),
            "BYMINUTE" => rule.by_minute = val.split(',').filter_map(|v| v.parse().ok()).collect(),
            "BYHOUR" => rule.by_hour = val.split(',').filter_map(|v| v.parse().ok()).collect(),
            "BYMONTHDAY" => {
                rule.by_monthday = val.split(',').filter_map(|v| v.parse().ok()).collect()
            }
            "BYYEARDAY" => {
                rule.by_yearday = val.split(',').filter_map(|v| v.parse().ok()).collect()
            }
            "BYWEEKNO" => rule.by_weekno = val.split(',').filter_map(|v| v.parse().ok()).collect(),
            "BYMONTH" => rule.by_month = val.split(',').filter_map(|v| v.parse().ok()).collect(),
            "BYSETPOS" => rule.by_setpos = val.split(',').filter_map(|v| v.parse().ok()).collect(),
            "BYDAY" => {
                rule.by_day = val
                    .split(',')
                    .filter_map(|token| {
                        let token = token.trim();
                        let split_at = token
                            .char_indices()
                            .find(|(_, c)| c.is_ascii_alphabetic())
                            .map(|(i, _)| i)?;
                        let (ord, wd) = token.split_at(split_at);
                        let weekday = parse_weekday(wd)?;
                        let ordinal = if ord.is_empty() {
                            None
                        } else {
                            ord.parse().ok()
                        };
                        Some(ByDay { ordinal, weekday })
                    })
                    .collect();
            }
            "WKST" => {
                if let Some(wd) = parse_weekday(val) {
                    rule.wkst = wd;
                }
            }
            _ => {}
        }
    }
    rule
}

fn parse_organizer(prop: &RawProperty) -> Organizer {
    Organizer {
        cn: prop.param("CN").map(|s| s.to_string()),
        email: strip_mailto(&prop.value),
    }
}

fn strip_mailto(value: &str) -> String {
    value
        .trim()
        .strip_prefix("mailto:")
        .or_else(|| value.trim().strip_prefix("MAILTO:"))
        .unwrap_or(value.trim())
        .to_string()
}

fn parse_attendee(prop: &RawProperty) -> Attendee {
    let role = prop.param("ROLE").and_then(|v| match v.to_ascii_uppercase().as_str() {
        "CHAIR" => Some(AttendeeRole::Chair),
        "REQ-PARTICIPANT" => Some(AttendeeRole::ReqParticipant),
        "OPT-PARTICIPANT" => Some(AttendeeRole::OptParticipant),
        "NON-PARTICIPANT" => Some(AttendeeRole::NonParticipant),
        _ => None,
    });
    let partstat = prop
        .param("PARTSTAT")
        .and_then(|v| match v.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(PartStat::NeedsAction),
            "ACCEPTED" => Some(PartStat::Accepted),
            "DECLINED" => Some(PartStat::Declined),
            "TENTATIVE" => Some(PartStat::Tentative),
            "DELEGATED" => Some(PartStat::Delegated),
            _ => None,
        });
    let rsvp = prop
        .param("RSVP")
        .map(|v| v.eq_ignore_ascii_case("TRUE"));
    let cutype = prop
        .param("CUTYPE")
        .map(|v| match v.to_ascii_uppercase().as_str() {
            "INDIVIDUAL" => CuType::Individual,
            "GROUP" => CuType::Group,
            "RESOURCE" => CuType::Resource,
            "ROOM" => CuType::Room,
            _ => CuType::Unknown,
        });
    Attendee {
        cn: prop.param("CN").map(|s| s.to_string()),
        email: strip_mailto(&prop.value),
        role,
        partstat,
        rsvp,
        cutype,
    }
}

fn parse_alarm(raw: &RawComponent) -> Alarm {
    let mut action = AlarmAction::Raw;
    let mut action_raw = None;
    let mut trigger = AlarmTrigger::Relative {
        duration: chrono::Duration::zero(),
        related_end: false,
    };
    let mut description = None;
    let mut summary = None;
    let mut attendees = Vec::new();
    let mut repeat = None;
    let mut duration = None;

    for prop in &raw.properties {
        match prop.name.to_ascii_uppercase().as_str() {
            "ACTION" => {
                action = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "AUDIO" => AlarmAction::Audio,
                    "DISPLAY" => AlarmAction::Display,
                    "EMAIL" => AlarmAction::Email,
                    other => {
                        action_raw = Some(other.to_string());
                        AlarmAction::Raw
                    }
                };
            }
            "TRIGGER" => {
                let is_date_time = prop
                    .param("VALUE")
                    .is_some_and(|v| v.eq_ignore_ascii_case("DATE-TIME"));
                trigger = if is_date_time {
                    parse_datetime(prop)
                        .map(AlarmTrigger::Absolute)
                        .unwrap_or(trigger)
                } else if let Some(d) = parse_duration(&prop.value) {
                    let related_end = prop
                        .param("RELATED")
                        .is_some_and(|v| v.eq_ignore_ascii_case("END"));
                    AlarmTrigger::Relative {
                        duration: d,
                        related_end,
                    }
                } else {
                    trigger
                };
            }
            "DESCRIPTION" => description = Some(unescape_text(&prop.value)),
            "SUMMARY" => summary = Some(unescape_text(&prop.value)),
            "ATTENDEE" => attendees.push(strip_mailto(&prop.value)),
            "REPEAT" => repeat = prop.value.trim().parse().ok(),
            "DURATION" => duration = parse_duration(&prop.value),
            _ => {}
        }
    }

    Alarm {
        action,
        action_raw,
        trigger,
        description,
        summary,
        attendees,
        repeat,
        duration,
    }
}

fn map_event(raw: &RawComponent) -> Result<ICalEvent, IcalError> {
    let mut uid = None;
    let mut summary = None;
    let mut description = None;
    let mut location = None;
    let mut dtstart = None;
    let mut dtend = None;
    let mut duration = None;
    let mut status = None;
    let mut classification = None;
    let mut transparency = Transparency::Opaque;
    let mut sequence = 0;
    let mut rrule = None;
    let mut rdates = Vec::new();
    let mut exdates = Vec::new();
    let mut recurrence_id = None;
    let mut categories = Vec::new();
    let mut organizer = None;
    let mut attendees = Vec::new();
    let mut color = None;
    let mut dtstamp = None;
    let mut last_modified = None;
    let mut created = None;
    let mut url = None;
    let mut raw_properties: RawProperties = Vec::new();

    for prop in &raw.properties {
        match prop.name.to_ascii_uppercase().as_str() {
            "UID" => uid = Some(prop.value.trim().to_string()),
            "SUMMARY" => summary = Some(unescape_text(&prop.value)),
            "DESCRIPTION" => description = Some(unescape_text(&prop.value)),
            "LOCATION" => location = Some(unescape_text(&prop.value)),
            "DTSTART" => dtstart = Some(parse_datetime(prop)?),
            "DTEND" => dtend = Some(parse_datetime(prop)?),
            "DURATION" => duration = parse_duration(&prop.value),
            "STATUS" => {
                status = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "TENTATIVE" => Some(EventStatus::Tentative),
                    "CONFIRMED" => Some(EventStatus::Confirmed),
                    "CANCELLED" => Some(EventStatus::Cancelled),
                    _ => None,
                };
            }
            "CLASS" => {
                classification = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "PUBLIC" => Some(Classification::Public),
                    "PRIVATE" => Some(Classification::Private),
                    "CONFIDENTIAL" => Some(Classification::Confidential),
                    _ => None,
                };
            }
            "TRANSP" => {
                transparency = if prop.value.trim().eq_ignore_ascii_case("TRANSPARENT") {
                    Transparency::Transparent
                } else {
                    Transparency::Opaque
                };
            }
            "SEQUENCE" => sequence = prop.value.trim().parse().unwrap_or(0),
            "RRULE" => rrule = Some(parse_rrule(&prop.value)),
            "RDATE" => {
                if prop
                    .param("VALUE")
                    .is_some_and(|v| v.eq_ignore_ascii_case("PERIOD"))
                {
                    // skipped; caller records this in ParseWarnings
                    continue;
                }
                for part in prop.value.split(',') {
                    let sub = RawProperty {
                        name: "RDATE".to_string(),
                        params: prop.params.clone(),
                        value: part.to_string(),
                    };
                    rdates.push(parse_datetime(&sub)?);
                }
            }
            "EXDATE" => {
                for part in prop.value.split(',') {
                    let sub = RawProperty {
                        name: "EXDATE".to_string(),
                        params: prop.params.clone(),
                        value: part.to_string(),
                    };
                    exdates.push(parse_datetime(&sub)?);
                }
            }
            "RECURRENCE-ID" => recurrence_id = Some(parse_datetime(prop)?),
            "CATEGORIES" => {
                categories.extend(prop.value.split(',').map(|s| unescape_text(s.trim())))
            }
            "ORGANIZER" => organizer = Some(parse_organizer(prop)),
            "ATTENDEE" => attendees.push(parse_attendee(prop)),
            "COLOR" => color = Some(prop.value.trim().to_string()),
            "DTSTAMP" => dtstamp = Some(parse_datetime(prop)?),
            "LAST-MODIFIED" => last_modified = Some(parse_datetime(prop)?),
            "CREATED" => created = Some(parse_datetime(prop)?),
            "URL" => url = Some(prop.value.trim().to_string()),
            other => {
                raw_properties.push(RawProperty {
                    name: prop.name.clone(),
                    params: prop.params.clone(),
                    value: prop.value.clone(),
                });
            }
        }
    }

    let uid = uid.ok_or_else(|| IcalError::MissingProperty {
        property: "UID".to_string(),
        component: "VEVENT".to_string(),
    })?;
    let dtstart = dtstart.ok_or_else(|| IcalError::MissingProperty {
        property: "DTSTART".to_string(),
        component: "VEVENT".to_string(),
    })?;

    let is_all_day = dtstart.is_date;
    let end = match (dtend, duration) {
        (Some(e), _) => Some(EventEnd::DtEnd(e)),
        (None, Some(d)) => Some(EventEnd::Duration(d)),
        (None, None) => None,
    };

    let alarms = raw.children.iter().map(parse_alarm).collect();
    let import_id = ICalEvent::compute_import_id(&uid, recurrence_id.as_ref());

    Ok(ICalEvent {
        uid,
        import_id,
        summary,
        description,
        location,
        dtstart,
        end,
        is_all_day,
        status,
        classification,
        transparency,
        sequence,
        rrule,
        rdates,
        exdates,
        recurrence_id,
        alarms,
        categories,
        organizer,
        attendees,
        color,
        dtstamp,
        last_modified,
        created,
        url,
        raw_properties,
    })
}

fn map_todo(raw: &RawComponent) -> Result<ICalTodo, IcalError> {
    let mut uid = None;
    let mut summary = None;
    let mut description = None;
    let mut dtstart = None;
    let mut due = None;
    let mut completed = None;
    let mut status = None;
    let mut classification = None;
    let mut sequence = 0;
    let mut rrule = None;
    let mut rdates = Vec::new();
    let mut exdates = Vec::new();
    let mut recurrence_id = None;
    let mut categories = Vec::new();
    let mut organizer = None;
    let mut attendees = Vec::new();
    let mut dtstamp = None;
    let mut last_modified = None;
    let mut created = None;
    let mut percent_complete = None;
    let mut raw_properties: RawProperties = Vec::new();

    for prop in &raw.properties {
        match prop.name.to_ascii_uppercase().as_str() {
            "UID" => uid = Some(prop.value.trim().to_string()),
            "SUMMARY" => summary = Some(unescape_text(&prop.value)),
            "DESCRIPTION" => description = Some(unescape_text(&prop.value)),
            "DTSTART" => dtstart = Some(parse_datetime(prop)?),
            "DUE" => due = Some(parse_datetime(prop)?),
            "COMPLETED" => completed = Some(parse_datetime(prop)?),
            "STATUS" => {
                status = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "NEEDS-ACTION" => Some(TodoStatus::NeedsAction),
                    "IN-PROCESS" => Some(TodoStatus::InProcess),
                    "COMPLETED" => Some(TodoStatus::Completed),
                    "CANCELLED" => Some(TodoStatus::Cancelled),
                    _ => None,
                };
            }
            "CLASS" => {
                classification = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "PUBLIC" => Some(Classification::Public),
                    "PRIVATE" => Some(Classification::Private),
                    "CONFIDENTIAL" => Some(Classification::Confidential),
                    _ => None,
                };
            }
            "SEQUENCE" => sequence = prop.value.trim().parse().unwrap_or(0),
            "RRULE" => rrule = Some(parse_rrule(&prop.value)),
            "RDATE" => {
                if prop
                    .param("VALUE")
                    .is_some_and(|v| v.eq_ignore_ascii_case("PERIOD"))
                {
                    continue;
                }
                for part in prop.value.split(',') {
                    let sub = RawProperty {
                        name: "RDATE".to_string(),
                        params: prop.params.clone(),
                        value: part.to_string(),
                    };
                    rdates.push(parse_datetime(&sub)?);
                }
            }
            "EXDATE" => {
                for part in prop.value.split(',') {
                    let sub = RawProperty {
                        name: "EXDATE".to_string(),
                        params: prop.params.clone(),
                        value: part.to_string(),
                    };
                    exdates.push(parse_datetime(&sub)?);
                }
            }
            "RECURRENCE-ID" => recurrence_id = Some(parse_datetime(prop)?),
            "CATEGORIES" => {
                categories.extend(prop.value.split(',').map(|s| unescape_text(s.trim())))
            }
            "ORGANIZER" => organizer = Some(parse_organizer(prop)),
            "ATTENDEE" => attendees.push(parse_attendee(prop)),
            "DTSTAMP" => dtstamp = Some(parse_datetime(prop)?),
            "LAST-MODIFIED" => last_modified = Some(parse_datetime(prop)?),
            "CREATED" => created = Some(parse_datetime(prop)?),
            "PERCENT-COMPLETE" => percent_complete = prop.value.trim().parse().ok(),
            other => {
                raw_properties.push(RawProperty {
                    name: prop.name.clone(),
                    params: prop.params.clone(),
                    value: prop.value.clone(),
                });
            }
        }
    }

    let uid = uid.ok_or_else(|| IcalError::MissingProperty {
        property: "UID".to_string(),
        component: "VTODO".to_string(),
    })?;
    let alarms = raw.children.iter().map(parse_alarm).collect();
    let import_id = ICalEvent::compute_import_id(&uid, recurrence_id.as_ref());

    Ok(ICalTodo {
        uid,
        import_id,
        summary,
        description,
        dtstart,
        due,
        completed,
        status,
        classification,
        sequence,
        rrule,
        rdates,
        exdates,
        recurrence_id,
        alarms,
        categories,
        organizer,
        attendees,
        dtstamp,
        last_modified,
        created,
        percent_complete,
        raw_properties,
    })
}

fn map_journal(raw: &RawComponent) -> Result<ICalJournal, IcalError> {
    let mut uid = None;
    let mut summary = None;
    let mut description = None;
    let mut dtstart = None;
    let mut status = None;
    let mut classification = None;
    let mut sequence = 0;
    let mut recurrence_id = None;
    let mut categories = Vec::new();
    let mut organizer = None;
    let mut dtstamp = None;
    let mut last_modified = None;
    let mut created = None;
    let mut raw_properties: RawProperties = Vec::new();

    for prop in &raw.properties {
        match prop.name.to_ascii_uppercase().as_str() {
            "UID" => uid = Some(prop.value.trim().to_string()),
            "SUMMARY" => summary = Some(unescape_text(&prop.value)),
            "DESCRIPTION" => description = Some(unescape_text(&prop.value)),
            "DTSTART" => dtstart = Some(parse_datetime(prop)?),
            "STATUS" => {
                status = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "DRAFT" => Some(JournalStatus::Draft),
                    "FINAL" => Some(JournalStatus::Final),
                    "CANCELLED" => Some(JournalStatus::Cancelled),
                    _ => None,
                };
            }
            "CLASS" => {
                classification = match prop.value.trim().to_ascii_uppercase().as_str() {
                    "PUBLIC" => Some(Classification::Public),
                    "PRIVATE" => Some(Classification::Private),
                    "CONFIDENTIAL" => Some(Classification::Confidential),
                    _ => None,
                };
            }
            "SEQUENCE" => sequence = prop.value.trim().parse().unwrap_or(0),
            "RECURRENCE-ID" => recurrence_id = Some(parse_datetime(prop)?),
            "CATEGORIES" => {
                categories.extend(prop.value.split(',').map(|s| unescape_text(s.trim())))
            }
            "ORGANIZER" => organizer = Some(parse_organizer(prop)),
            "DTSTAMP" => dtstamp = Some(parse_datetime(prop)?),
            "LAST-MODIFIED" => last_modified = Some(parse_datetime(prop)?),
            "CREATED" => created = Some(parse_datetime(prop)?),
            other => {
                raw_properties.push(RawProperty {
                    name: prop.name.clone(),
                    params: prop.params.clone(),
                    value: prop.value.clone(),
                });
            }
        }
    }

    let uid = uid.ok_or_else(|| IcalError::MissingProperty {
        property: "UID".to_string(),
        component: "VJOURNAL".to_string(),
    })?;
    let import_id = ICalEvent::compute_import_id(&uid, recurrence_id.as_ref());

    Ok(ICalJournal {
        uid,
        import_id,
        summary,
        description,
        dtstart,
        status,
        classification,
        sequence,
        recurrence_id,
        categories,
        organizer,
        dtstamp,
        last_modified,
        created,
        raw_properties,
    })
}

/// Generate the bare `BEGIN:VTIMEZONE...END:VTIMEZONE` block text back from
/// its component tree, since `VTIMEZONE` is preserved opaquely rather than
/// modeled.
fn render_opaque(raw: &RawComponent) -> String {
    let mut out = format!("BEGIN:{}\r\n", raw.name);
    for prop in &raw.properties {
        out.push_str(&prop.name);
        for (k, vs) in &prop.params {
            out.push(';');
            out.push_str(k);
            out.push('=');
            out.push_str(&vs.join(","));
        }
        out.push(':');
        out.push_str(&prop.value);
        out.push_str("\r\n");
    }
    for child in &raw.children {
        out.push_str(&render_opaque(child));
    }
    out.push_str(&format!("END:{}\r\n", raw.name));
    out
}

/// Parse a full `VCALENDAR` stream. Per §4.1, a single unparsable
/// `VEVENT`/`VTODO`/`VJOURNAL` yields a [`IcalError`] recorded for that
/// component in the returned [`ParseWarnings`] rather than aborting the
/// whole stream.
pub fn parse_calendar_stream(raw: &str) -> Result<(ICalCalendar, ParseWarnings), IcalError> {
    let lines = unfold_lines(raw);
    let roots = parse_components(&lines)?;
    let root = roots
        .into_iter()
        .find(|c| c.name == "VCALENDAR")
        .ok_or_else(|| IcalError::MalformedNesting {
            component: "VCALENDAR".to_string(),
        })?;

    let mut calendar = ICalCalendar::default();
    let mut warnings = ParseWarnings::default();

    for prop in &root.properties {
        match prop.name.to_ascii_uppercase().as_str() {
            "PRODID" => calendar.prod_id = prop.value.clone(),
            "VERSION" => calendar.version = prop.value.clone(),
            _ => {}
        }
    }

    for child in &root.children {
        match child.name.as_str() {
            "VEVENT" => {
                for prop in &child.properties {
                    if prop.name.eq_ignore_ascii_case("RDATE")
                        && prop
                            .param("VALUE")
                            .is_some_and(|v| v.eq_ignore_ascii_case("PERIOD"))
                    {
                        warnings.skipped_periods.push(prop.value.clone());
                    }
                }
                match map_event(child) {
                    Ok(event) => calendar.events.push(event),
                    Err(e) => warnings.failed_components.push(ComponentParseFailure {
                        component: "VEVENT".to_string(),
                        message: e.to_string(),
                    }),
                }
            }
            "VTODO" => match map_todo(child) {
                Ok(todo) => calendar.todos.push(todo),
                Err(e) => warnings.failed_components.push(ComponentParseFailure {
                    component: "VTODO".to_string(),
                    message: e.to_string(),
                }),
            },
            "VJOURNAL" => match map_journal(child) {
                Ok(journal) => calendar.journals.push(journal),
                Err(e) => warnings.failed_components.push(ComponentParseFailure {
                    component: "VJOURNAL".to_string(),
                    message: e.to_string(),
                }),
            },
            "VTIMEZONE" => {
                let tzid = child
                    .properties
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case("TZID"))
                    .map(|p| p.value.clone())
                    .unwrap_or_default();
                calendar.timezones.insert(tzid, render_opaque(child));
            }
            _ => {}
        }
    }

    Ok((calendar, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfolds_continuation_lines() {
        let raw = "SUMMARY:Hi\r\n there\r\nUID:a\r\n";
        let lines = unfold_lines(raw);
        assert_eq!(lines, vec!["SUMMARY:Hi there".to_string(), "UID:a".to_string()]);
    }

    #[test]
    fn parses_params_and_quoted_values() {
        let p = parse_property_line(r#"DTSTART;TZID="America/New York":20240101T100000"#).unwrap();
        assert_eq!(p.name, "DTSTART");
        assert_eq!(p.param("TZID"), Some("America/New York"));
        assert_eq!(p.value, "20240101T100000");
    }

    #[test]
    fn parses_minimal_calendar() {
        let raw = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//EN\r\nBEGIN:VEVENT\r\nUID:a@x\r\nDTSTAMP:20240101T000000Z\r\nDTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\nSUMMARY:Hi\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let (cal, warnings) = parse_calendar_stream(raw).unwrap();
        assert_eq!(cal.events.len(), 1);
        assert!(warnings.failed_components.is_empty());
        let event = &cal.events[0];
        assert_eq!(event.uid, "a@x");
        assert_eq!(event.summary.as_deref(), Some("Hi"));
    }

    #[test]
    fn bad_event_does_not_abort_stream() {
        let raw = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//EN\r\nBEGIN:VEVENT\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\nBEGIN:VEVENT\r\nUID:good@x\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let (cal, warnings) = parse_calendar_stream(raw).unwrap();
        assert_eq!(cal.events.len(), 1);
        assert_eq!(warnings.failed_components.len(), 1);
    }
}
