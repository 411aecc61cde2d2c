//! FHIR date and time values in HL7 DTM form: `YYYY[MM[DD[HHMM[SS[.S+]]]]][+/-ZZZZ]`.
//!
//! The precision of the source value is kept. Values that do not look like FHIR
//! temporal values are returned unchanged.

use chrono::NaiveDate;

/// Converts a FHIR `date`, `dateTime` or `instant` to DTM.
pub fn to_dtm(value: &str) -> String {
    let value = value.trim();
    let (date, rest) = match value.split_once('T') {
        Some((date, rest)) => (date, Some(rest)),
        None => (value, None),
    };
    let Some(date) = compact_date(date) else {
        return value.to_string();
    };
    let Some(rest) = rest else {
        return date;
    };

    let (time, offset) = split_offset(rest);
    let Some(time) = compact_time(time) else {
        return value.to_string();
    };
    format!("{}{}{}", date, time, offset)
}

fn compact_date(date: &str) -> Option<String> {
    let parts: Vec<&str> = date.split('-').collect();
    let valid = match parts.as_slice() {
        [year] => year.len() == 4,
        [year, month] => year.len() == 4 && month.len() == 2,
        [year, month, day] => {
            year.len() == 4
                && NaiveDate::parse_from_str(&format!("{}-{}-{}", year, month, day), "%Y-%m-%d").is_ok()
        }
        _ => false,
    };
    (valid && parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit()))).then(|| parts.concat())
}

fn split_offset(rest: &str) -> (&str, String) {
    if let Some(time) = rest.strip_suffix('Z') {
        return (time, "+0000".to_string());
    }
    match rest.rfind(['+', '-']) {
        Some(position) => {
            let (time, offset) = rest.split_at(position);
            (time, offset.replace(':', ""))
        }
        None => (rest, String::new()),
    }
}

fn compact_time(time: &str) -> Option<String> {
    let (clock, fraction) = match time.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (time, None),
    };
    let parts: Vec<&str> = clock.split(':').collect();
    if !(2..=3).contains(&parts.len())
        || parts
            .iter()
            .any(|p| p.len() != 2 || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut out = parts.concat();
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        out.push('.');
        out.push_str(fraction);
    }
    Some(out)
}
