//! Pairs message bodies with the timestamp marker that precedes them.
//!
//! The "current marker" is threaded explicitly through [`step`]; [`Pairer`]
//! just keeps the fold state for streaming sources.
use chrono::{DateTime, FixedOffset};
use promo_common::MarkerScope;

use crate::timestamp::{Marker, parse_timestamp};

/// A message body and the marker in effect when it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub marker: Marker,
}

/// One fold step: `(marker, fragment) -> (new_marker, emitted message)`.
///
/// Blank fragments are ignored and leave the marker untouched. A fragment
/// read before any marker is discarded.
pub fn step(
    scope: MarkerScope,
    marker: Option<Marker>,
    fragment: &str,
    now: DateTime<FixedOffset>,
) -> (Option<Marker>, Option<Message>) {
    if fragment.trim().is_empty() {
        return (marker, None);
    }
    if let Some(found) = parse_timestamp(fragment, now) {
        return (Some(found), None);
    }
    let Some(current) = marker else {
        return (None, None);
    };

    let message = Message {
        text: fragment.to_string(),
        marker: current,
    };
    let next = match scope {
        MarkerScope::SingleMessage => None,
        MarkerScope::UntilNextMarker => Some(current),
    };
    (next, Some(message))
}

/// Streaming state for [`step`].
#[derive(Debug, Clone)]
pub struct Pairer {
    scope: MarkerScope,
    now: DateTime<FixedOffset>,
    current: Option<Marker>,
}

impl Pairer {
    pub fn new(scope: MarkerScope, now: DateTime<FixedOffset>) -> Self {
        Self {
            scope,
            now,
            current: None,
        }
    }

    /// Feed the next fragment in page order.
    pub fn push(&mut self, fragment: &str) -> Option<Message> {
        let (next, message) = step(self.scope, self.current, fragment, self.now);
        self.current = next;
        message
    }

    /// Marker that the next message would be paired with.
    pub fn current(&self) -> Option<Marker> {
        self.current
    }
}

/// Pair a finite fragment list in one go.
///
/// ```
/// use chrono::DateTime;
/// use promo_common::MarkerScope;
/// use promo_social::pairing::pair_messages;
///
/// let now = DateTime::parse_from_rfc3339("2024-12-20T10:00:00+09:00").unwrap();
/// let messages = pair_messages(["3時間前", "hello", "orphan"], MarkerScope::SingleMessage, now);
/// assert_eq!(messages.len(), 1);
/// assert_eq!(messages[0].text, "hello");
/// ```
pub fn pair_messages<I, S>(fragments: I, scope: MarkerScope, now: DateTime<FixedOffset>) -> Vec<Message>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut pairer = Pairer::new(scope, now);
    fragments
        .into_iter()
        .filter_map(|fragment| pairer.push(fragment.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-12-20T10:00:00+09:00").unwrap()
    }

    fn marker(rfc3339: &str) -> Marker {
        Marker::new(DateTime::parse_from_rfc3339(rfc3339).unwrap())
    }

    const FEED: [&str; 4] = ["3時間前", "冬の特別企画!12月25日 室料半額", "1日前", "ただの告知"];

    #[test]
    fn pairs_alternating_date_and_body() {
        let messages = pair_messages(FEED, MarkerScope::SingleMessage, now());
        assert_eq!(
            messages,
            vec![
                Message {
                    text: FEED[1].to_string(),
                    marker: marker("2024-12-20T07:00:00+09:00"),
                },
                Message {
                    text: FEED[3].to_string(),
                    marker: marker("2024-12-19T10:00:00+09:00"),
                },
            ]
        );
    }

    #[test]
    fn fragments_before_any_marker_are_dropped() {
        let messages = pair_messages(["header", "3時間前", "body"], MarkerScope::SingleMessage, now());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "body");
    }

    #[test]
    fn single_message_scope_resets_after_one_body() {
        let messages = pair_messages(["3時間前", "first", "second"], MarkerScope::SingleMessage, now());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "first");
    }

    #[test]
    fn until_next_marker_scope_keeps_the_marker() {
        let messages = pair_messages(
            ["3時間前", "first", "second", "1日前", "third"],
            MarkerScope::UntilNextMarker,
            now(),
        );
        let markers: Vec<_> = messages.iter().map(|m| m.marker).collect();
        assert_eq!(
            markers,
            vec![
                marker("2024-12-20T07:00:00+09:00"),
                marker("2024-12-20T07:00:00+09:00"),
                marker("2024-12-19T10:00:00+09:00"),
            ]
        );
    }

    #[test]
    fn later_marker_supersedes_earlier_one() {
        let messages = pair_messages(["3時間前", "1日前", "body"], MarkerScope::SingleMessage, now());
        assert_eq!(messages[0].marker, marker("2024-12-19T10:00:00+09:00"));
    }

    #[test]
    fn blank_fragments_do_not_consume_the_marker() {
        let messages = pair_messages(["3時間前", "   ", "body"], MarkerScope::SingleMessage, now());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "body");
    }

    #[test]
    fn step_is_pure() {
        let m = marker("2024-12-20T07:00:00+09:00");
        let (next, msg) = step(MarkerScope::SingleMessage, Some(m), "body", now());
        assert_eq!(next, None);
        assert_eq!(msg.map(|m| m.marker), Some(m));

        let (next, msg) = step(MarkerScope::SingleMessage, None, "5分前", now());
        assert_eq!(next, Some(marker("2024-12-20T09:55:00+09:00")));
        assert!(msg.is_none());
    }

    #[test]
    fn pairer_exposes_current_marker() {
        let mut pairer = Pairer::new(MarkerScope::SingleMessage, now());
        assert!(pairer.current().is_none());
        assert!(pairer.push("3時間前").is_none());
        assert!(pairer.current().is_some());
        assert!(pairer.push("body").is_some());
        assert!(pairer.current().is_none());
    }
}
