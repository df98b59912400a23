//! Reading a public Facebook page feed through a WebDriver session.
//!
//! The feed is rendered lazily; each post carries `aria-posinset="<n>"` and
//! only appears after the previous one has been scrolled into view.
pub mod feed;

pub use feed::{FacebookFeed, FeedSelectors};
