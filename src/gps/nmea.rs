// src/gps/nmea.rs
//! NMEA sentence validation and decoding
//!
//! Only checksummed sentences are decoded. Anything malformed, unknown or
//! truncated decodes to `None` so a reader can drop it and move on.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::str::FromStr;

/// Sentence types understood by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentenceKind {
    Gsa,
    Gga,
    Rmc,
    Vtg,
    Hdg,
}

impl SentenceKind {
    /// Sentence tag including the leading `$`.
    pub fn tag(self) -> &'static str {
        match self {
            SentenceKind::Gsa => "$GPGSA",
            SentenceKind::Gga => "$GPGGA",
            SentenceKind::Rmc => "$GPRMC",
            SentenceKind::Vtg => "$GPVTG",
            SentenceKind::Hdg => "$HCHDG",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "$GPGSA" => Some(SentenceKind::Gsa),
            "$GPGGA" => Some(SentenceKind::Gga),
            "$GPRMC" => Some(SentenceKind::Rmc),
            "$GPVTG" => Some(SentenceKind::Vtg),
            "$HCHDG" => Some(SentenceKind::Hdg),
            _ => None,
        }
    }
}

/// Partial fix information decoded from a single sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FixFragment {
    /// GSA - DOP and active satellites. Only the 2D/3D fix mode is kept.
    Gsa { fix_quality: u8 },
    /// GGA - fix data. The sentence has no date, so `timestamp` is today (UTC)
    /// at the sentence time.
    Gga {
        hour: u32,
        min: u32,
        sec: u32,
        timestamp: DateTime<Utc>,
        lat: f64,
        lon: f64,
        /// Meters above mean sea level
        altitude: f64,
        fix_type: u8,
    },
    /// RMC - recommended minimum data.
    Rmc {
        hour: u32,
        min: u32,
        sec: u32,
        day: u32,
        month: u32,
        year: i32,
        timestamp: DateTime<Utc>,
        lat: f64,
        lon: f64,
        /// Knots
        speed: f64,
        /// Track made good, degrees true
        heading: f64,
    },
    /// VTG - track made good and ground speed.
    Vtg { heading: f64, speed: f64 },
    /// HCHDG - magnetic compass heading.
    Hdg { heading: f64 },
}

impl FixFragment {
    pub fn kind(&self) -> SentenceKind {
        match self {
            FixFragment::Gsa { .. } => SentenceKind::Gsa,
            FixFragment::Gga { .. } => SentenceKind::Gga,
            FixFragment::Rmc { .. } => SentenceKind::Rmc,
            FixFragment::Vtg { .. } => SentenceKind::Vtg,
            FixFragment::Hdg { .. } => SentenceKind::Hdg,
        }
    }
}

/// Validate the `*HH` checksum of a `$...*HH` sentence.
///
/// The checksum is the XOR of every byte between `$` and `*`. The suffix
/// must be exactly two hex digits and is compared case-insensitively.
pub fn checksum(sentence: &str) -> bool {
    let Some(body) = sentence.trim().strip_prefix('$') else {
        return false;
    };
    let Some((payload, suffix)) = body.split_once('*') else {
        return false;
    };
    if suffix.len() != 2 || !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return false;
    }

    match u8::from_str_radix(suffix, 16) {
        Ok(expected) => payload.bytes().fold(0u8, |acc, b| acc ^ b) == expected,
        Err(_) => false,
    }
}

/// Wrap a payload (without `$`) into a complete checksummed sentence
pub fn with_checksum(payload: &str) -> String {
    let sum = payload.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${}*{:02X}", payload, sum)
}

/// Decode a sentence into a fix fragment.
///
/// Returns `None` for a bad checksum, an unsupported sentence or any field
/// that fails to convert.
pub fn decode(sentence: &str) -> Option<FixFragment> {
    let sentence = sentence.trim();
    if !checksum(sentence) {
        return None;
    }

    // Drop the tag and the last field, which carries the checksum
    let parts: Vec<&str> = sentence.split(',').collect();
    let kind = SentenceKind::from_tag(parts[0])?;
    let fields = parts.get(1..parts.len() - 1)?;

    match kind {
        SentenceKind::Gsa => decode_gsa(fields),
        SentenceKind::Gga => decode_gga(fields),
        SentenceKind::Rmc => decode_rmc(fields),
        SentenceKind::Vtg => decode_vtg(fields),
        SentenceKind::Hdg => decode_hdg(fields),
    }
}

// $GPGSA,A,3,04,05,,09,12,,,24,,,,,2.5,1.3,2.1*39
fn decode_gsa(fields: &[&str]) -> Option<FixFragment> {
    Some(FixFragment::Gsa {
        fix_quality: parse_field(fields, 1)?,
    })
}

// $GPGGA,113623,5021.9979,N,00407.9635,W,3,08,0.9,545.4,M,46.9,M,,*5E
fn decode_gga(fields: &[&str]) -> Option<FixFragment> {
    let (hour, min, sec) = parse_time(fields.first()?)?;
    let lat = parse_coordinate(fields.get(1)?, fields.get(2)?, "S")?;
    let lon = parse_coordinate(fields.get(3)?, fields.get(4)?, "W")?;
    let fix_type = parse_field(fields, 5)?;
    let altitude = parse_field(fields, 8)?;

    let naive = Utc::now().date_naive().and_hms_opt(hour, min, sec)?;

    Some(FixFragment::Gga {
        hour,
        min,
        sec,
        timestamp: Utc.from_utc_datetime(&naive),
        lat,
        lon,
        altitude,
        fix_type,
    })
}

// $GPRMC,113623.12,A,5021.9979,N,00407.9635,W,0.0,358.1,310315,2.2,W,A*3A
fn decode_rmc(fields: &[&str]) -> Option<FixFragment> {
    let (hour, min, sec) = parse_time(fields.first()?)?;
    let lat = parse_coordinate(fields.get(2)?, fields.get(3)?, "S")?;
    let lon = parse_coordinate(fields.get(4)?, fields.get(5)?, "W")?;
    let speed = parse_field(fields, 6)?;
    let heading = parse_field(fields, 7)?;
    let (day, month, year) = parse_date(fields.get(8)?)?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)?;

    Some(FixFragment::Rmc {
        hour,
        min,
        sec,
        day,
        month,
        year,
        timestamp: Utc.from_utc_datetime(&naive),
        lat,
        lon,
        speed,
        heading,
    })
}

// $GPVTG,232.7,T,234.9,M,1.3,N,2.4,K,A*2F
fn decode_vtg(fields: &[&str]) -> Option<FixFragment> {
    Some(FixFragment::Vtg {
        heading: parse_field(fields, 0)?,
        speed: parse_field(fields, 4)?,
    })
}

// $HCHDG,359.6,0.0,E,2.2,W*59
fn decode_hdg(fields: &[&str]) -> Option<FixFragment> {
    Some(FixFragment::Hdg {
        heading: parse_field(fields, 0)?,
    })
}

fn parse_field<T: FromStr>(fields: &[&str], index: usize) -> Option<T> {
    fields.get(index)?.parse().ok()
}

/// `HHMMSS[.frac]`, seconds rounded half-up to a whole second.
fn parse_time(raw: &str) -> Option<(u32, u32, u32)> {
    let hour = raw.get(0..2)?.parse().ok()?;
    let min = raw.get(2..4)?.parse().ok()?;
    let secs: f64 = raw.get(4..)?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((hour, min, round_half_up(secs) as u32))
}

/// `DDMMYY`, two-digit years are taken as 20YY.
fn parse_date(raw: &str) -> Option<(u32, u32, i32)> {
    let day = raw.get(0..2)?.parse().ok()?;
    let month = raw.get(2..4)?.parse().ok()?;
    let mut year: i32 = raw.get(4..6)?.parse().ok()?;
    if year < 1900 {
        year += 2000;
    }
    Some((day, month, year))
}

/// `[D]DDMM.mmmm` plus hemisphere to signed decimal degrees.
fn parse_coordinate(raw: &str, hemisphere: &str, negative: &str) -> Option<f64> {
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let degrees = (value / 100.0).floor();
    let minutes = value % 100.0;
    let decimal = degrees + minutes / 60.0;

    Some(if hemisphere == negative { -decimal } else { decimal })
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}
