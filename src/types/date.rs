//! DATE and TIMESTAMP encoding and decoding
//!
//! DATE is a 7-byte field:
//!
//! - byte 0: century + 100
//! - byte 1: year in century + 100
//! - byte 2: month (1-12)
//! - byte 3: day (1-31)
//! - bytes 4-6: hour + 1, minute + 1, second + 1
//!
//! TIMESTAMP appends a big-endian u32 of nanoseconds; TIMESTAMP WITH TIME
//! ZONE appends two more bytes, hour offset + 20 and minute offset + 60.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike};

use crate::error::{Error, Result};

/// Encode a date-time to the 7-byte DATE form
pub fn encode_date(value: &NaiveDateTime) -> Result<[u8; 7]> {
    let year = value.year();
    if !(-4712..=9999).contains(&year) {
        return Err(Error::ValueTooLarge(format!(
            "year {} outside DATE range",
            year
        )));
    }
    Ok([
        (year / 100 + 100) as u8,
        (year % 100 + 100) as u8,
        value.month() as u8,
        value.day() as u8,
        value.hour() as u8 + 1,
        value.minute() as u8 + 1,
        value.second() as u8 + 1,
    ])
}

/// Encode a date-time to the 11-byte TIMESTAMP form
pub fn encode_timestamp(value: &NaiveDateTime) -> Result<[u8; 11]> {
    let date = encode_date(value)?;
    let nanos = value.nanosecond().to_be_bytes();
    let mut out = [0u8; 11];
    out[..7].copy_from_slice(&date);
    out[7..].copy_from_slice(&nanos);
    Ok(out)
}

/// Encode a zoned date-time to the 13-byte TIMESTAMP WITH TIME ZONE form
pub fn encode_timestamp_tz(value: &DateTime<FixedOffset>) -> Result<[u8; 13]> {
    let ts = encode_timestamp(&value.naive_local())?;
    let offset_seconds = value.offset().local_minus_utc();
    let mut out = [0u8; 13];
    out[..11].copy_from_slice(&ts);
    out[11] = (offset_seconds / 3600 + 20) as u8;
    out[12] = ((offset_seconds % 3600) / 60 + 60) as u8;
    Ok(out)
}

fn decode_date_fields(data: &[u8]) -> Result<NaiveDateTime> {
    if data.len() < 7 {
        return Err(Error::UnsupportedConversion(format!(
            "DATE field of {} bytes",
            data.len()
        )));
    }
    let year = (data[0] as i32 - 100) * 100 + (data[1] as i32 - 100);
    let date = NaiveDate::from_ymd_opt(year, data[2] as u32, data[3] as u32)
        .ok_or_else(|| Error::UnsupportedConversion("invalid DATE calendar fields".into()))?;
    date.and_hms_opt(
        data[4].wrapping_sub(1) as u32,
        data[5].wrapping_sub(1) as u32,
        data[6].wrapping_sub(1) as u32,
    )
    .ok_or_else(|| Error::UnsupportedConversion("invalid DATE time fields".into()))
}

/// Decode a 7-byte DATE or 11-byte TIMESTAMP into a date-time.
///
/// The fractional-seconds field is honored when present.
pub fn decode_date(data: &[u8]) -> Result<NaiveDateTime> {
    let base = decode_date_fields(data)?;
    if data.len() >= 11 {
        let nanos = u32::from_be_bytes([data[7], data[8], data[9], data[10]]);
        base.with_nanosecond(nanos)
            .ok_or_else(|| Error::UnsupportedConversion("invalid fractional seconds".into()))
    } else {
        Ok(base)
    }
}

/// Decode a 13-byte TIMESTAMP WITH TIME ZONE
pub fn decode_timestamp_tz(data: &[u8]) -> Result<DateTime<FixedOffset>> {
    if data.len() < 13 {
        return Err(Error::UnsupportedConversion(format!(
            "TIMESTAMP WITH TIME ZONE field of {} bytes",
            data.len()
        )));
    }
    let local = decode_date(&data[..11])?;
    let offset_seconds = (data[11] as i32 - 20) * 3600 + (data[12] as i32 - 60) * 60;
    let offset = FixedOffset::east_opt(offset_seconds)
        .ok_or_else(|| Error::UnsupportedConversion("invalid time zone offset".into()))?;
    local
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| Error::UnsupportedConversion("ambiguous local time".into()))
}
