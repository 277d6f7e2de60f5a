//! Timestamp coercion and day-offset arithmetic.
//!
//! Appointment fields cross the record-store boundary as raw strings because
//! the upstream records were written by several dashboard generations and the
//! stored shape varies. Every collector funnels those values through
//! [`coerce_to_instant`] so the rest of the system only ever handles
//! `DateTime<Utc>`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Interpret a raw timestamp string as a UTC instant.
///
/// Naive shapes (no offset) are interpreted in the clinic timezone, since
/// that is where the records were entered. Returns `None` for empty or
/// unrecognizable values; callers treat that as "no appointment set".
///
/// Recognized shapes, tried in order:
/// - RFC 3339 / ISO 8601 with offset (`2026-03-14T09:30:00+01:00`)
/// - naive datetime, `T` or space separated (`2026-03-14 09:30:00`)
/// - bare date (`2026-03-14`), taken as local midnight
/// - unix epoch seconds or milliseconds
pub fn coerce_to_instant(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return local_to_utc(naive, tz);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return local_to_utc(date.and_hms_opt(0, 0, 0)?, tz);
    }

    if raw.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = raw.parse().ok()?;
        // Millisecond epochs are 13 digits until the year 33658.
        let dt = if raw.len() >= 13 {
            DateTime::from_timestamp_millis(n)
        } else {
            DateTime::from_timestamp(n, 0)
        };
        return dt;
    }

    None
}

fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    // `earliest` resolves DST-gap ambiguity deterministically; Benin has no
    // DST so both interpretations coincide in practice.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Signed whole-day distance between an appointment and "today", both taken
/// as calendar dates in the clinic timezone. Negative means overdue.
pub fn day_offset(appointment: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> i64 {
    let appointment_date = appointment.with_timezone(&tz).date_naive();
    let today = now.with_timezone(&tz).date_naive();
    (appointment_date - today).num_days()
}
