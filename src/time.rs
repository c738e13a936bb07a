//! Browser timestamp encodings.
//!
//! WebKit stores microseconds since 1601-01-01T00:00:00Z, Gecko stores
//! microseconds since the Unix epoch. All arithmetic is checked so any `i64`
//! input decodes to either an instant or `None`.

use chrono::{DateTime, Utc};

use crate::browser::BrowserKind;

/// Microseconds between 1601-01-01 and 1970-01-01.
pub const WEBKIT_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

pub fn decode_webkit_time(raw: i64) -> Option<DateTime<Utc>> {
    let unix_micros = raw.checked_sub(WEBKIT_EPOCH_OFFSET_MICROS)?;
    DateTime::<Utc>::from_timestamp_micros(unix_micros)
}

pub fn encode_webkit_time(instant: DateTime<Utc>) -> Option<i64> {
    instant
        .timestamp_micros()
        .checked_add(WEBKIT_EPOCH_OFFSET_MICROS)
}

/// Zero and NULL mean "never visited" and decode to `None`, not the epoch.
pub fn decode_gecko_time(raw: Option<i64>) -> Option<DateTime<Utc>> {
    match raw {
        None | Some(0) => None,
        Some(micros) => DateTime::<Utc>::from_timestamp_micros(micros),
    }
}

pub fn encode_gecko_time(instant: DateTime<Utc>) -> Option<i64> {
    match instant.timestamp_micros() {
        0 => None,
        micros => Some(micros),
    }
}

pub fn decode(kind: BrowserKind, raw: Option<i64>) -> Option<DateTime<Utc>> {
    match kind {
        BrowserKind::WebKit => raw.and_then(decode_webkit_time),
        BrowserKind::Gecko => decode_gecko_time(raw),
    }
}
