//! Event announcement detection and date inference.
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use thiserror::Error;

use crate::pairing::Message;
use crate::timestamp::parse_digits;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventDateError {
    #[error("invalid calendar date: {year:04}-{month:02}-{day:02}")]
    InvalidCalendarDate { year: i32, month: u32, day: u32 },
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("event keyword must not be empty")]
    EmptyKeyword,
    #[error("failed to build event pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

/// A detected announcement with its resolved date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAnnouncement {
    pub month_day: MonthDay,
    pub date: NaiveDate,
    pub message: Message,
}

/// Finds `<month>月<day>日` followed anywhere later by a fixed keyword.
#[derive(Debug, Clone)]
pub struct EventDetector {
    pattern: Regex,
    keyword: String,
}

impl EventDetector {
    pub fn new(keyword: &str) -> Result<Self, DetectorError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(DetectorError::EmptyKeyword);
        }
        let pattern = Regex::new(&format!(
            r"(?s)(?P<month>[0-9０-９]+)月(?P<day>[0-9０-９]+)日.*{}",
            regex::escape(keyword)
        ))?;
        Ok(Self {
            pattern,
            keyword: keyword.to_string(),
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Leftmost month/day that has the keyword somewhere after it.
    ///
    /// ```
    /// use promo_social::EventDetector;
    ///
    /// let detector = EventDetector::new("室料半額").unwrap();
    /// let md = detector.detect("冬の特別企画!12月25日 室料半額").unwrap();
    /// assert_eq!((md.month, md.day), (12, 25));
    /// assert!(detector.detect("室料半額 12月25日").is_none());
    /// ```
    pub fn detect(&self, text: &str) -> Option<MonthDay> {
        let caps = self.pattern.captures(text)?;
        let month = u32::try_from(parse_digits(caps.name("month")?.as_str())?).ok()?;
        let day = u32::try_from(parse_digits(caps.name("day")?.as_str())?).ok()?;
        Some(MonthDay { month, day })
    }

    /// Detect and resolve against the message's own post date.
    ///
    /// `Ok(None)` means "not an announcement"; an error means the announced
    /// month/day is not a real date.
    pub fn infer(&self, message: &Message) -> Result<Option<EventAnnouncement>, EventDateError> {
        let Some(month_day) = self.detect(&message.text) else {
            return Ok(None);
        };
        let date = resolve_event_date(month_day.month, month_day.day, message.marker.date())?;
        Ok(Some(EventAnnouncement {
            month_day,
            date,
            message: message.clone(),
        }))
    }
}

/// Place `month`/`day` on or after `post_date`.
///
/// The post's own year is tried first; if that date lies before the post (or
/// does not exist, as with 29 February), the following year is used.
/// A post-year candidate that does not exist is therefore not an error by
/// itself: [`EventDateError::InvalidCalendarDate`] is returned only when the
/// following year has no such date either.
///
/// ```
/// use chrono::NaiveDate;
/// use promo_social::resolve_event_date;
///
/// let post = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();
/// assert_eq!(resolve_event_date(1, 5, post).unwrap().to_string(), "2025-01-05");
/// ```
pub fn resolve_event_date(
    month: u32,
    day: u32,
    post_date: NaiveDate,
) -> Result<NaiveDate, EventDateError> {
    let year = post_date.year();
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(candidate) if candidate >= post_date => Ok(candidate),
        _ => year
            .checked_add(1)
            .and_then(|next| NaiveDate::from_ymd_opt(next, month, day))
            .ok_or(EventDateError::InvalidCalendarDate { year, month, day }),
    }
}
