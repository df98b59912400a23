//! Side effect performed once per newly announced event date.
use async_trait::async_trait;
use chrono::NaiveDate;
use promo_http::HttpError;
use thiserror::Error;

use crate::credentials::CredentialError;

pub mod google;
pub mod webhook;

pub use google::GoogleCalendarRegistrar;
pub use webhook::WebhookRegistrar;

/// What gets registered: an all-day event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRegistration {
    pub title: String,
    pub date: NaiveDate,
}

/// Identifiers returned by the remote side, when it provides any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub id: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("registration rejected with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Registrar: Send {
    async fn register(
        &mut self,
        event: &EventRegistration,
    ) -> Result<RegistrationReceipt, RegistrarError>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}
