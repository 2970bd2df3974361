//! RFC 5545 generation: line folding at 75 octets and property rendering.

use crate::ical::escape::escape_text;
use crate::ical::model::*;

const FOLD_WIDTH: usize = 75;

/// Fold one logical line (already containing no CRLF) into physical lines
/// of at most 75 octets, continuation lines prefixed with a single space.
/// Folding must not split a UTF-8 multi-byte sequence.
pub fn fold_line(line: &str) -> String {
    let bytes = line.as_bytes();
    if bytes.len() <= FOLD_WIDTH {
        return format!("{line}\r\n");
    }

    let mut out = String::new();
    let mut start = 0;
    let mut first = true;
    while start < bytes.len() {
        let budget = if first { FOLD_WIDTH } else { FOLD_WIDTH - 1 };
        let mut end = (start + budget).min(bytes.len());
        while end > start && !line.is_char_boundary(end) {
            end -= 1;
        }
        if !first {
            out.push(' ');
        }
        out.push_str(&line[start..end]);
        out.push_str("\r\n");
        start = end;
        first = false;
    }
    out
}

fn push_prop(out: &mut String, name: &str, value: &str) {
    out.push_str(&fold_line(&format!("{name}:{value}")));
}

fn push_prop_params(out: &mut String, name: &str, params: &[(&str, String)], value: &str) {
    let mut line = name.to_string();
    for (k, v) in params {
        line.push(';');
        line.push_str(k);
        line.push('=');
        line.push_str(v);
    }
    line.push(':');
    line.push_str(value);
    out.push_str(&fold_line(&line));
}

/// Render a preserved [`RawProperty`] back onto the wire, quoting any
/// parameter value that contains a delimiter (`:`, `;`, `,`) per RFC 5545
/// §3.2 — the parser strips such quotes on the way in, so they must be
/// reinstated on the way out for the value to remain parseable.
fn push_raw_property(out: &mut String, prop: &RawProperty) {
    let mut line = prop.name.clone();
    for (pname, values) in &prop.params {
        line.push(';');
        line.push_str(pname);
        line.push('=');
        let rendered: Vec<String> = values
            .iter()
            .map(|v| {
                if v.contains([':', ';', ',']) {
                    format!("\"{v}\"")
                } else {
                    v.clone()
                }
            })
            .collect();
        line.push_str(&rendered.join(","));
    }
    line.push(':');
    line.push_str(&prop.value);
    out.push_str(&fold_line(&line));
}

fn format_datetime(dt: &ICalDateTime) -> (Vec<(&'static str, String)>, String) {
    if dt.is_date {
        return (vec![("VALUE", "DATE".to_string())], dt.timestamp.format("%Y%m%d").to_string());
    }
    if dt.is_utc {
        return (Vec::new(), dt.timestamp.format("%Y%m%dT%H%M%SZ").to_string());
    }
    match &dt.timezone {
        Some(tz) => (
            vec![("TZID", tz.clone())],
            dt.timestamp.format("%Y%m%dT%H%M%S").to_string(),
        ),
        None => (Vec::new(), dt.timestamp.format("%Y%m%dT%H%M%S").to_string()),
    }
}

fn push_datetime(out: &mut String, name: &str, dt: &ICalDateTime) {
    let (params, value) = format_datetime(dt);
    push_prop_params(out, name, &params, &value);
}

fn render_duration(d: &chrono::Duration) -> String {
    let mut secs = d.num_seconds();
    let negative = secs < 0;
    secs = secs.abs();
    let days = secs / 86400;
    secs %= 86400;
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    secs %= 60;

    let mut s = String::new();
    if negative {
        s.push('-');
    }
    s.push('P');
    if days > 0 {
        s.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        s.push('T');
        if hours > 0 {
            s.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            s.push_str(&format!("{minutes}M"));
        }
        if secs > 0 {
            s.push_str(&format!("{secs}S"));
        }
    }
    if days == 0 && hours == 0 && minutes == 0 && secs == 0 {
        s.push_str("T0S");
    }
    s
}

/// Render an `RRULE` value's content (everything after `RRULE:`). Exposed
/// for the recurrence engine, which round-trips an `RRule` through this
/// text form to hand off FREQ/BY* filtering to the `rrule` crate.
pub fn render_rrule(r: &RRule) -> String {
    let mut parts = Vec::new();
    let freq = match r.freq {
        Frequency::Secondly => "SECONDLY",
        Frequency::Minutely => "MINUTELY",
        Frequency::Hourly => "HOURLY",
        Frequency::Daily => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Yearly => "YEARLY",
    };
    parts.push(format!("FREQ={freq}"));
    if r.interval != 1 {
        parts.push(format!("INTERVAL={}", r.interval));
    }
    if let Some(count) = r.count {
        parts.push(format!("COUNT={count}"));
    }
    if let Some(until) = &r.until {
        let (_, value) = format_datetime(until);
        parts.push(format!("UNTIL={value}"));
    }
    let join = |xs: &[i8]| xs.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",");
    if !r.by_month.is_empty() {
        parts.push(format!(
            "BYMONTH={}",
            r.by_month.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
        ));
    }
    if !r.by_monthday.is_empty() {
        parts.push(format!("BYMONTHDAY={}", join(&r.by_monthday)));
    }
    if !r.by_yearday.is_empty() {
        parts.push(format!(
            "BYYEARDAY={}",
            r.by_yearday.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
        ));
    }
    if !r.by_weekno.is_empty() {
        parts.push(format!("BYWEEKNO={}", join(&r.by_weekno)));
    }
    if !r.by_day.is_empty() {
        let s = r
            .by_day
            .iter()
            .map(|bd| {
                let wd = match bd.weekday {
                    Weekday::Mo => "MO",
                    Weekday::Tu => "TU",
                    Weekday::We => "WE",
                    Weekday::Th => "TH",
                    Weekday::Fr => "FR",
                    Weekday::Sa => "SA",
                    Weekday::Su => "SU",
                };
                match bd.ordinal {
                    Some(n) => format!("{n}{wd}"),
                    None => wd.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        parts.push(format!("BYDAY={s}"));
    }
    if !r.by_hour.is_empty() {
        parts.push(format!(
            "BYHOUR={}",
            r.by_hour.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
        ));
    }
    if !r.by_minute.is_empty() {
        parts.push(format!(
            "BYMINUTE={}",
            r.by_minute.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
        ));
    }
    if !r.by_second.is_empty() {
        parts.push(format!(
            "BYSECOND={}",
            r.by_second.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
        ));
    }
    if !r.by_setpos.is_empty() {
        parts.push(format!(
            "BYSETPOS={}",
            r.by_setpos.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",")
        ));
    }
    if r.wkst != Weekday::Mo {
        let wd = match r.wkst {
            Weekday::Mo => "MO",
            Weekday::Tu => "TU",
            Weekday::We => "WE",
            Weekday::Th => "TH",
            Weekday::Fr => "FR",
            Weekday::Sa => "SA",
            Weekday::Su => "SU",
        };
        parts.push(format!("WKST={wd}"));
    }
    parts.join(";")
}

fn push_alarm(out: &mut String, alarm: &Alarm) {
    out.push_str(&fold_line("BEGIN:VALARM"));
    let action = match alarm.action {
        AlarmAction::Audio => "AUDIO",
        AlarmAction::Display => "DISPLAY",
        AlarmAction::Email => "EMAIL",
        AlarmAction::Raw => alarm.action_raw.as_deref().unwrap_or("DISPLAY"),
    };
    push_prop(out, "ACTION", action);
    match &alarm.trigger {
        AlarmTrigger::Relative {
            duration,
            related_end,
        } => {
            let params: Vec<(&str, String)> = if *related_end {
                vec![("RELATED", "END".to_string())]
            } else {
                Vec::new()
            };
            push_prop_params(out, "TRIGGER", &params, &render_duration(duration));
        }
        AlarmTrigger::Absolute(dt) => {
            let (mut params, value) = format_datetime(dt);
            params.push(("VALUE", "DATE-TIME".to_string()));
            push_prop_params(out, "TRIGGER", &params, &value);
        }
    }
    if let Some(d) = &alarm.description {
        push_prop(out, "DESCRIPTION", &escape_text(d));
    }
    if let Some(s) = &alarm.summary {
        push_prop(out, "SUMMARY", &escape_text(s));
    }
    for a in &alarm.attendees {
        push_prop(out, "ATTENDEE", &format!("mailto:{a}"));
    }
    if let Some(r) = alarm.repeat {
        push_prop(out, "REPEAT", &r.to_string());
    }
    if let Some(d) = &alarm.duration {
        push_prop(out, "DURATION", &render_duration(d));
    }
    out.push_str(&fold_line("END:VALARM"));
}

/// Generate a single `VEVENT` block (without the `VCALENDAR` envelope).
pub fn generate_event(event: &ICalEvent) -> String {
    let mut out = String::new();
    out.push_str(&fold_line("BEGIN:VEVENT"));
    push_prop(&mut out, "UID", &event.uid);
    if let Some(dtstamp) = &event.dtstamp {
        push_datetime(&mut out, "DTSTAMP", dtstamp);
    }
    push_datetime(&mut out, "DTSTART", &event.dtstart);
    match &event.end {
        Some(EventEnd::DtEnd(dt)) => push_datetime(&mut out, "DTEND", dt),
        Some(EventEnd::Duration(d)) => push_prop(&mut out, "DURATION", &render_duration(d)),
        None => {}
    }
    if let Some(s) = &event.summary {
        push_prop(&mut out, "SUMMARY", &escape_text(s));
    }
    if let Some(d) = &event.description {
        push_prop(&mut out, "DESCRIPTION", &escape_text(d));
    }
    if let Some(l) = &event.location {
        push_prop(&mut out, "LOCATION", &escape_text(l));
    }
    if let Some(status) = event.status {
        let s = match status {
            EventStatus::Tentative => "TENTATIVE",
            EventStatus::Confirmed => "CONFIRMED",
            EventStatus::Cancelled => "CANCELLED",
        };
        push_prop(&mut out, "STATUS", s);
    }
    if let Some(class) = event.classification {
        let s = match class {
            Classification::Public => "PUBLIC",
            Classification::Private => "PRIVATE",
            Classification::Confidential => "CONFIDENTIAL",
        };
        push_prop(&mut out, "CLASS", s);
    }
    if event.transparency == Transparency::Transparent {
        push_prop(&mut out, "TRANSP", "TRANSPARENT");
    }
    push_prop(&mut out, "SEQUENCE", &event.sequence.to_string());
    if let Some(rrule) = &event.rrule {
        push_prop(&mut out, "RRULE", &render_rrule(rrule));
    }
    for rdate in &event.rdates {
        push_datetime(&mut out, "RDATE", rdate);
    }
    for exdate in &event.exdates {
        push_datetime(&mut out, "EXDATE", exdate);
    }
    if let Some(rid) = &event.recurrence_id {
        push_datetime(&mut out, "RECURRENCE-ID", rid);
    }
    if !event.categories.is_empty() {
        let joined = event
            .categories
            .iter()
            .map(|c| escape_text(c))
            .collect::<Vec<_>>()
            .join(",");
        push_prop(&mut out, "CATEGORIES", &joined);
    }
    if let Some(org) = &event.organizer {
        let params: Vec<(&str, String)> = org
            .cn
            .as_ref()
            .map(|cn| vec![("CN", cn.clone())])
            .unwrap_or_default();
        push_prop_params(&mut out, "ORGANIZER", &params, &format!("mailto:{}", org.email));
    }
    for attendee in &event.attendees {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(cn) = &attendee.cn {
            params.push(("CN", cn.clone()));
        }
        if let Some(role) = attendee.role {
            let s = match role {
                AttendeeRole::Chair => "CHAIR",
                AttendeeRole::ReqParticipant => "REQ-PARTICIPANT",
                AttendeeRole::OptParticipant => "OPT-PARTICIPANT",
                AttendeeRole::NonParticipant => "NON-PARTICIPANT",
            };
            params.push(("ROLE", s.to_string()));
        }
        if let Some(partstat) = attendee.partstat {
            let s = match partstat {
                PartStat::NeedsAction => "NEEDS-ACTION",
                PartStat::Accepted => "ACCEPTED",
                PartStat::Declined => "DECLINED",
                PartStat::Tentative => "TENTATIVE",
                PartStat::Delegated => "DELEGATED",
            };
            params.push(("PARTSTAT", s.to_string()));
        }
        if let Some(rsvp) = attendee.rsvp {
            params.push(("RSVP", if rsvp { "TRUE" } else { "FALSE" }.to_string()));
        }
        push_prop_params(
            &mut out,
            "ATTENDEE",
            &params,
            &format!("mailto:{}", attendee.email),
        );
    }
    if let Some(c) = &event.color {
        push_prop(&mut out, "COLOR", c);
    }
    if let Some(lm) = &event.last_modified {
        push_datetime(&mut out, "LAST-MODIFIED", lm);
    }
    if let Some(c) = &event.created {
        push_datetime(&mut out, "CREATED", c);
    }
    if let Some(url) = &event.url {
        push_prop(&mut out, "URL", url);
    }
    for prop in &event.raw_properties {
        push_raw_property(&mut out, prop);
    }
    for alarm in &event.alarms {
        push_alarm(&mut out, alarm);
    }
    out.push_str(&fold_line("END:VEVENT"));
    out
}

/// Generate a full `VCALENDAR` document containing the calendar's events
/// (todos/journals follow the same per-component pattern and are omitted
/// here only because no caller currently needs them generated; the
/// `VTIMEZONE` blocks are re-emitted verbatim from their preserved text).
pub fn generate_calendar(calendar: &ICalCalendar) -> String {
    let mut out = String::new();
    out.push_str(&fold_line("BEGIN:VCALENDAR"));
    push_prop(&mut out, "VERSION", &calendar.version);
    push_prop(&mut out, "PRODID", &calendar.prod_id);
    for block in calendar.timezones.values() {
        out.push_str(block);
    }
    for event in &calendar.events {
        out.push_str(&generate_event(event));
    }
    out.push_str(&fold_line("END:VCALENDAR"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_at_75_octets() {
        let long = "SUMMARY:".to_string() + &"x".repeat(200);
        let folded = fold_line(&long);
        for line in folded.split("\r\n") {
            assert!(line.as_bytes().len() <= FOLD_WIDTH, "{}", line.len());
        }
    }

    #[test]
    fn parse_generate_round_trip_scenario() {
        use crate::ical::parser::parse_calendar_stream;
        let raw = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//T//EN\r\nBEGIN:VEVENT\r\nUID:a@x\r\nDTSTAMP:20240101T000000Z\r\nDTSTART:20240101T100000Z\r\nDTEND:20240101T110000Z\r\nSUMMARY:Hi\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let (cal, _) = parse_calendar_stream(raw).unwrap();
        let generated = generate_calendar(&cal);
        let (cal2, _) = parse_calendar_stream(&generated).unwrap();
        assert_eq!(cal.events[0].uid, cal2.events[0].uid);
        assert_eq!(cal.events[0].summary, cal2.events[0].summary);
        assert_eq!(cal.events[0].dtstart, cal2.events[0].dtstart);
    }
}
