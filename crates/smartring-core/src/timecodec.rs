//! The ring's textual timestamp format.
//!
//! Firmware reports wall-clock times as `"YYYY.MM.DD HH:mm:ss"` or a bare
//! `"YYYY.MM.DD"`, in the wearer's local time and without an offset. The
//! offset is supplied by the caller so the codec stays deterministic.
//!
//! Parsing never fails loudly: malformed, partial or all-zero input yields
//! `None` and the caller skips the field.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year].[month].[day]");
const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year].[month].[day] [hour]:[minute]:[second]");

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Parse a ring timestamp into epoch milliseconds.
///
/// Accepts `"YYYY.MM.DD HH:mm:ss"` and `"YYYY.MM.DD"` (midnight). Each part
/// must be numeric, the date must exist on the calendar, and the result
/// must be after the epoch.
///
/// ```
/// use smartring_core::timecodec::parse_x3_datetime;
/// use time::UtcOffset;
///
/// let ts = parse_x3_datetime("2024.03.05 07:30:00", UtcOffset::UTC);
/// assert_eq!(ts, Some(1_709_623_800_000));
/// assert_eq!(parse_x3_datetime("", UtcOffset::UTC), None);
/// assert_eq!(parse_x3_datetime("0000.00.00 00:00:00", UtcOffset::UTC), None);
/// ```
pub fn parse_x3_datetime(value: &str, offset: UtcOffset) -> Option<i64> {
    let mut parts = value.split_whitespace();
    let date_part = parts.next()?;
    let time_part = parts.next();
    if parts.next().is_some() {
        return None;
    }

    let [year, month, day] = split_fields(date_part, '.')?;
    let [hour, minute, second] = match time_part {
        Some(t) => split_fields(t, ':')?,
        None => [0, 0, 0],
    };

    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    let date = Date::from_calendar_date(i32::try_from(year).ok()?, month, u8::try_from(day).ok()?)
        .ok()?;
    let time = Time::from_hms(
        u8::try_from(hour).ok()?,
        u8::try_from(minute).ok()?,
        u8::try_from(second).ok()?,
    )
    .ok()?;

    let ms = PrimitiveDateTime::new(date, time)
        .assume_offset(offset)
        .unix_timestamp()
        .checked_mul(1000)?;
    (ms > 0).then_some(ms)
}

/// Split `text` into exactly three non-negative integers.
fn split_fields(text: &str, separator: char) -> Option<[u32; 3]> {
    let mut fields = text.split(separator).map(|f| f.trim().parse::<u32>().ok());
    let a = fields.next()??;
    let b = fields.next()??;
    let c = fields.next()??;
    if fields.next().is_some() {
        return None;
    }
    Some([a, b, c])
}

/// The host's current UTC offset, or UTC when it cannot be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Minutes since local midnight of `timestamp_ms`, in `0..1440`.
pub fn minutes_since_midnight(timestamp_ms: i64, offset: UtcOffset) -> u32 {
    let local_minutes = timestamp_ms.div_euclid(60_000) + i64::from(offset.whole_minutes());
    local_minutes.rem_euclid(MINUTES_PER_DAY) as u32
}

fn to_local(timestamp_ms: i64, offset: UtcOffset) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ms) * 1_000_000)
        .ok()
        .map(|t| t.to_offset(offset))
}

/// Local calendar date of `timestamp_ms` as `"YYYY.MM.DD"`.
pub fn format_x3_date(timestamp_ms: i64, offset: UtcOffset) -> Option<String> {
    to_local(timestamp_ms, offset)?.format(DATE_FORMAT).ok()
}

/// Local time of `timestamp_ms` as `"YYYY.MM.DD HH:mm:ss"`.
pub fn format_x3_datetime(timestamp_ms: i64, offset: UtcOffset) -> Option<String> {
    to_local(timestamp_ms, offset)?.format(DATETIME_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset(hours: i8) -> UtcOffset {
        UtcOffset::from_hms(hours, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_full_timestamp() {
        assert_eq!(
            parse_x3_datetime("2024.03.05 07:30:00", UtcOffset::UTC),
            Some(1_709_623_800_000)
        );
    }

    #[test]
    fn test_parse_applies_offset() {
        let utc = parse_x3_datetime("2024.03.05 07:30:00", UtcOffset::UTC).unwrap();
        let plus_two = parse_x3_datetime("2024.03.05 07:30:00", offset(2)).unwrap();
        assert_eq!(utc - plus_two, 2 * 3_600_000);
    }

    #[test]
    fn test_parse_date_only_is_midnight() {
        let date = parse_x3_datetime("2024.01.02", UtcOffset::UTC).unwrap();
        let midnight = parse_x3_datetime("2024.01.02 00:00:00", UtcOffset::UTC).unwrap();
        assert_eq!(date, midnight);
    }

    #[test]
    fn test_parse_tolerates_surrounding_whitespace() {
        assert!(parse_x3_datetime("  2024.01.02   23:00:00 ", UtcOffset::UTC).is_some());
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for input in [
            "",
            "   ",
            "0000.00.00",
            "0000.00.00 00:00:00",
            "2024-03-05 07:30:00",
            "2024.03",
            "2024.03.05.01",
            "2024.13.01",
            "2024.02.30",
            "2024.03.05 07:30",
            "2024.03.05 25:00:00",
            "2024.03.05 07:30:00 extra",
            "yyyy.mm.dd",
            "1970.01.01 00:00:00",
        ] {
            assert_eq!(parse_x3_datetime(input, UtcOffset::UTC), None, "{input:?}");
        }
    }

    #[test]
    fn test_minutes_since_midnight() {
        let ts = parse_x3_datetime("2024.01.01 23:15:00", offset(1)).unwrap();
        assert_eq!(minutes_since_midnight(ts, offset(1)), 23 * 60 + 15);
        assert_eq!(minutes_since_midnight(ts, UtcOffset::UTC), 22 * 60 + 15);
    }

    #[test]
    fn test_minutes_since_midnight_wraps_negative_offsets() {
        let ts = parse_x3_datetime("2024.01.01 01:00:00", UtcOffset::UTC).unwrap();
        assert_eq!(minutes_since_midnight(ts, offset(-3)), 22 * 60);
    }

    #[test]
    fn test_format_round_trips() {
        let ts = parse_x3_datetime("2024.07.09 18:05:03", offset(-5)).unwrap();
        assert_eq!(format_x3_date(ts, offset(-5)).as_deref(), Some("2024.07.09"));
        assert_eq!(
            format_x3_datetime(ts, offset(-5)).as_deref(),
            Some("2024.07.09 18:05:03")
        );
    }

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
