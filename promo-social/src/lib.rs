//! Post extraction and event inference for promotional social feeds.
//!
//! The pipeline is a fold over text fragments in on-page order:
//!
//! 1. [`timestamp::parse_timestamp`] recognises relative (`3時間前`) and
//!    absolute (`12月20日`, `2024/12/20`) timestamp lines.
//! 2. [`pairing::Pairer`] attaches each message body to the marker that
//!    precedes it.
//! 3. [`event::EventDetector`] finds `<month>月<day>日 ... <keyword>`
//!    announcements and [`event::resolve_event_date`] turns them into a
//!    concrete date on or after the post.
//!
//! Fragments come from a [`source::FragmentSource`]: the rendered Facebook
//! page ([`facebook::FacebookFeed`]) or a saved replay file.
pub mod event;
pub mod facebook;
pub mod pairing;
pub mod source;
pub mod timestamp;

pub use event::{EventAnnouncement, EventDateError, EventDetector, MonthDay, resolve_event_date};
pub use pairing::{Message, Pairer};
pub use source::{FragmentSource, ReplaySource};
pub use timestamp::{Marker, parse_timestamp};
