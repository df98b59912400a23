//! Driver layer for browser automation.
//!
//! This crate exposes the WebDriver session and page/element helpers the
//! feed sources use to read rendered posts.
//!
//! - [`browser::driver::BrowserDriver`]: WebDriver client wrapper and Chrome launch options
//! - [`browser::page::PageSession`]: navigation, waits, text reads and scrolling
//! - [`browser::pacing::Pacing`]: small randomised pauses between page interactions
pub mod browser;
