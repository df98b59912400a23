//! Timestamp lines as rendered on the page (`ja-JP` locale).
//!
//! Matching is anchored at the start of the trimmed fragment and lenient at
//! the tail, so decorative suffixes the page appends to date links are ignored.
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeDelta};
use regex::{Captures, Regex};

/// Offset of the zone every marker is resolved in (UTC+9).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<num>[0-9０-９]+)(?P<unit>秒|分|時間|日)前").expect("relative timestamp rule")
});

static ABSOLUTE_KANJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<year>[0-9０-９]+)年)?(?P<month>[0-9０-９]+)月(?P<day>[0-9０-９]+)日")
        .expect("absolute kanji timestamp rule")
});

static ABSOLUTE_SLASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<year>[0-9０-９]{4})/(?P<month>[0-9０-９]{1,2})/(?P<day>[0-9０-９]{1,2})")
        .expect("absolute slash timestamp rule")
});

/// Build the fixed zone for an hour offset, `None` if out of range.
pub fn fixed_zone(hours: i32) -> Option<FixedOffset> {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
}

/// A resolved point in time taken from a timestamp line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Marker(DateTime<FixedOffset>);

impl Marker {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<FixedOffset> {
        self.0
    }

    /// Calendar date of the post in the marker's own zone.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElapsedUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl ElapsedUnit {
    fn from_glyph(glyph: &str) -> Option<Self> {
        match glyph {
            "秒" => Some(Self::Seconds),
            "分" => Some(Self::Minutes),
            "時間" => Some(Self::Hours),
            "日" => Some(Self::Days),
            _ => None,
        }
    }

    fn times(self, n: i64) -> Option<TimeDelta> {
        match self {
            Self::Seconds => TimeDelta::try_seconds(n),
            Self::Minutes => TimeDelta::try_minutes(n),
            Self::Hours => TimeDelta::try_hours(n),
            Self::Days => TimeDelta::try_days(n),
        }
    }
}

/// Parse ASCII or full-width decimal digits.
pub(crate) fn parse_digits(raw: &str) -> Option<i64> {
    let mut value: i64 = 0;
    let mut seen = false;
    for ch in raw.chars() {
        let digit = match ch {
            '0'..='9' => ch as u32 - '0' as u32,
            '０'..='９' => ch as u32 - '０' as u32,
            _ => return None,
        };
        value = value.checked_mul(10)?.checked_add(i64::from(digit))?;
        seen = true;
    }
    seen.then_some(value)
}

fn capture_number(caps: &Captures<'_>, name: &str) -> Option<i64> {
    caps.name(name).and_then(|m| parse_digits(m.as_str()))
}

/// Parse one fragment as a timestamp relative to `now`.
///
/// Returns `None` when the fragment is not a timestamp line, or when it names
/// an impossible date or an out-of-range duration.
///
/// ```
/// use chrono::DateTime;
/// use promo_social::parse_timestamp;
///
/// let now = DateTime::parse_from_rfc3339("2024-12-20T10:00:00+09:00").unwrap();
/// let marker = parse_timestamp("3時間前", now).unwrap();
/// assert_eq!(marker.at().to_rfc3339(), "2024-12-20T07:00:00+09:00");
/// assert!(parse_timestamp("ただの告知", now).is_none());
/// ```
pub fn parse_timestamp(text: &str, now: DateTime<FixedOffset>) -> Option<Marker> {
    let text = text.trim();

    if let Some(caps) = RELATIVE.captures(text) {
        let n = capture_number(&caps, "num")?;
        let unit = ElapsedUnit::from_glyph(caps.name("unit")?.as_str())?;
        let elapsed = unit.times(n)?;
        return now.checked_sub_signed(elapsed).map(Marker);
    }

    let caps = ABSOLUTE_KANJI
        .captures(text)
        .or_else(|| ABSOLUTE_SLASH.captures(text))?;
    let year = match capture_number(&caps, "year") {
        Some(y) => i32::try_from(y).ok()?,
        None => now.year(),
    };
    let month = u32::try_from(capture_number(&caps, "month")?).ok()?;
    let day = u32::try_from(capture_number(&caps, "day")?).ok()?;

    let midnight = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    midnight
        .and_local_timezone(*now.offset())
        .single()
        .map(Marker)
}
