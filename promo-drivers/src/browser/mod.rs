pub mod driver;
pub mod pacing;
pub mod page;

pub use driver::{BrowserDriver, DriverOptions};
pub use page::{PageElement, PageSession};
