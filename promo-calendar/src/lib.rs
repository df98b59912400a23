//! Registration of detected events, deduplicated by an append-only ledger.
//!
//! - [`ledger`]: the `YYYY-MM-DD` per line record and the strictly-newer rule
//! - [`registrar`]: the side effect (Google Calendar insert or webhook POST)
//! - [`credentials`]: bearer tokens for the calendar API
pub mod credentials;
pub mod ledger;
pub mod registrar;

pub use credentials::{AuthorizedUserFile, CredentialError, CredentialProvider, StaticToken};
pub use ledger::{Ledger, LedgerError, LedgerSession, should_register};
pub use registrar::{
    EventRegistration, GoogleCalendarRegistrar, Registrar, RegistrarError, RegistrationReceipt,
    WebhookRegistrar,
};
