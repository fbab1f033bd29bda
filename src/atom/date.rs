//! ATOM date constructs (`<updated>`, `<published>`).
//!
//! ATOM mandates RFC 3339 timestamps, but catalogs in the wild also send bare
//! dates (`2011-03`), timestamps without a zone, or RSS-style RFC 2822 dates.
//! All of these are accepted; anything else yields `None` so the caller can
//! leave the field unset.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

/// Wall-clock time part of a [`DateConstruct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanosecond: u32,
}

/// A parsed date construct, keeping the precision the source text had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateConstruct {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub time: Option<TimeOfDay>,
    /// Offset from UTC in minutes, `None` if the text carried no zone.
    pub utc_offset_minutes: Option<i32>,
}

impl DateConstruct {
    /// Parses date-construct text. Never panics; returns `None` for malformed
    /// or out-of-range input.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        parse_reduced(text)
            .or_else(|| parse_timestamp(text))
            .or_else(|| {
                let dt = DateTime::parse_from_rfc2822(text).ok()?;
                Some(Self::from_datetime(&dt, Some(dt.offset().local_minus_utc() / 60)))
            })
    }

    /// The instant this construct denotes. Missing month/day default to 1,
    /// a missing time to midnight and a missing zone to UTC.
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))?;
        let time = match self.time {
            Some(t) => NaiveTime::from_hms_nano_opt(t.hour, t.minute, t.second, t.nanosecond)?,
            None => NaiveTime::MIN,
        };
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.unwrap_or(0) * 60)?;
        date.and_time(time).and_local_timezone(offset).single()
    }

    fn from_datetime<T: Datelike + Timelike>(dt: &T, utc_offset_minutes: Option<i32>) -> Self {
        Self {
            year: dt.year(),
            month: Some(dt.month()),
            day: Some(dt.day()),
            time: Some(TimeOfDay {
                hour: dt.hour(),
                minute: dt.minute(),
                second: dt.second(),
                nanosecond: dt.nanosecond(),
            }),
            utc_offset_minutes,
        }
    }
}

impl fmt::Display for DateConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        let Some(month) = self.month else {
            return Ok(());
        };
        write!(f, "-{:02}", month)?;
        let Some(day) = self.day else {
            return Ok(());
        };
        write!(f, "-{:02}", day)?;
        let Some(time) = self.time else {
            return Ok(());
        };
        write!(f, "T{:02}:{:02}:{:02}", time.hour, time.minute, time.second)?;
        if time.nanosecond > 0 {
            let frac = format!("{:09}", time.nanosecond);
            write!(f, ".{}", frac.trim_end_matches('0'))?;
        }
        match self.utc_offset_minutes {
            None => Ok(()),
            Some(0) => write!(f, "Z"),
            Some(minutes) => {
                let sign = if minutes < 0 { '-' } else { '+' };
                let abs = minutes.abs();
                write!(f, "{}{:02}:{:02}", sign, abs / 60, abs % 60)
            }
        }
    }
}

/// Reduced-precision dates: `YYYY`, `YYYY-MM` and `YYYY-MM-DD`.
fn parse_reduced(text: &str) -> Option<DateConstruct> {
    if text.len() == 10 {
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
        return Some(DateConstruct {
            year: date.year(),
            month: Some(date.month()),
            day: Some(date.day()),
            time: None,
            utc_offset_minutes: None,
        });
    }

    let bytes = text.as_bytes();
    let digits = |range: std::ops::Range<usize>| {
        bytes
            .get(range)
            .is_some_and(|b| b.iter().all(u8::is_ascii_digit))
    };
    let month = match bytes.len() {
        4 if digits(0..4) => None,
        7 if digits(0..4) && bytes[4] == b'-' && digits(5..7) => Some(text[5..7].parse().ok()?),
        _ => return None,
    };
    if month.is_some_and(|m| !(1..=12).contains(&m)) {
        return None;
    }
    Some(DateConstruct {
        year: text[..4].parse().ok()?,
        month,
        day: None,
        time: None,
        utc_offset_minutes: None,
    })
}

/// Date and time, with optional seconds, fraction and zone.
fn parse_timestamp(text: &str) -> Option<DateConstruct> {
    const ZONED: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"];
    const LOCAL: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

    let zoned = |dt: DateTime<FixedOffset>| {
        DateConstruct::from_datetime(&dt, Some(dt.offset().local_minus_utc() / 60))
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(zoned(dt));
    }

    // Lowercase `t`/`z` and a space separator are accepted too.
    let mut normalized = text.to_ascii_uppercase();
    if normalized.as_bytes().get(10) == Some(&b' ') {
        normalized.replace_range(10..11, "T");
    }
    if normalized.ends_with('Z') {
        normalized.pop();
        normalized.push_str("+00:00");
    }

    if let Some(dt) = ZONED
        .iter()
        .find_map(|format| DateTime::parse_from_str(&normalized, format).ok())
    {
        return Some(zoned(dt));
    }
    LOCAL
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .map(|dt| DateConstruct::from_datetime(&dt, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_full_rfc3339() {
        let date = DateConstruct::parse("2011-03-05T18:30:02Z").unwrap();
        assert_eq!(date.year, 2011);
        assert_eq!(date.month, Some(3));
        assert_eq!(date.day, Some(5));
        assert_eq!(
            date.time,
            Some(TimeOfDay {
                hour: 18,
                minute: 30,
                second: 2,
                nanosecond: 0
            })
        );
        assert_eq!(date.utc_offset_minutes, Some(0));

        let expected = chrono::Utc.with_ymd_and_hms(2011, 3, 5, 18, 30, 2).unwrap();
        assert_eq!(date.to_datetime().unwrap(), expected);
    }

    #[test]
    fn test_parse_offset_and_fraction() {
        let date = DateConstruct::parse("2003-12-13T18:30:02.25+01:30").unwrap();
        assert_eq!(date.utc_offset_minutes, Some(90));
        assert_eq!(date.time.unwrap().nanosecond, 250_000_000);
        assert_eq!(date.to_string(), "2003-12-13T18:30:02.25+01:30");
    }

    #[test]
    fn test_parse_negative_offset() {
        let date = DateConstruct::parse("2003-12-13T08:30:02-05:00").unwrap();
        assert_eq!(date.utc_offset_minutes, Some(-300));
        assert_eq!(date.to_datetime().unwrap().timestamp(), 1071322202);
    }

    #[test]
    fn test_parse_partial_dates() {
        let year = DateConstruct::parse("2010").unwrap();
        assert_eq!((year.month, year.day), (None, None));
        assert_eq!(year.to_string(), "2010");

        let month = DateConstruct::parse("2010-07").unwrap();
        assert_eq!(month.month, Some(7));
        assert_eq!(month.day, None);

        let day = DateConstruct::parse(" 2010-07-14 ").unwrap();
        assert_eq!(day.day, Some(14));
        assert!(day.time.is_none());
        assert_eq!(day.to_string(), "2010-07-14");
    }

    #[test]
    fn test_parse_without_seconds_or_zone() {
        let date = DateConstruct::parse("2010-07-14t09:15").unwrap();
        let time = date.time.unwrap();
        assert_eq!((time.hour, time.minute, time.second), (9, 15, 0));
        assert_eq!(date.utc_offset_minutes, None);
    }

    #[test]
    fn test_parse_rfc2822_fallback() {
        let date = DateConstruct::parse("Tue, 1 Jul 2003 10:52:37 +0200").unwrap();
        assert_eq!(date.year, 2003);
        assert_eq!(date.month, Some(7));
        assert_eq!(date.utc_offset_minutes, Some(120));
    }

    #[test]
    fn test_malformed_dates_rejected() {
        for text in [
            "",
            "not-a-date",
            "20110305",
            "2011-13-01",
            "2011-02-30",
            "2011-02-10T25:00:00Z",
            "2011-02-10T10:61",
            "2011-02-10T10:00:00+24:00",
            "2011-02-10T10:00:00Zjunk",
            "2011-02-10T10:00:00.",
            "२०११",
        ] {
            assert!(DateConstruct::parse(text).is_none(), "accepted {text:?}");
        }
    }

    #[test]
    fn test_parse_zone_without_seconds() {
        let date = DateConstruct::parse("2011-02-10T10:00Z").unwrap();
        assert_eq!(date.utc_offset_minutes, Some(0));
        assert_eq!(date.time.unwrap().second, 0);

        let compact = DateConstruct::parse("2011-02-10 10:00:00+0530").unwrap();
        assert_eq!(compact.utc_offset_minutes, Some(330));
    }

    #[test]
    fn test_display_round_trips_utc() {
        let text = "1999-01-31T23:59:59Z";
        assert_eq!(DateConstruct::parse(text).unwrap().to_string(), text);
    }
}
