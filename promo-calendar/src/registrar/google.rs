use async_trait::async_trait;
use chrono::NaiveDate;
use promo_http::{Auth, HttpClient, HttpError, HttpStatus, RequestOpts};
use serde::{Deserialize, Serialize};

use super::{EventRegistration, Registrar, RegistrarError, RegistrationReceipt};
use crate::credentials::CredentialProvider;

pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[derive(Debug, Serialize)]
struct AllDay {
    date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct InsertEvent<'a> {
    summary: &'a str,
    start: AllDay,
    end: AllDay,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    html_link: Option<String>,
}

/// Inserts an all-day event into a Google Calendar.
pub struct GoogleCalendarRegistrar {
    http: HttpClient,
    calendar_id: String,
    credentials: Box<dyn CredentialProvider>,
}

impl GoogleCalendarRegistrar {
    pub fn new(
        http: HttpClient,
        calendar_id: impl Into<String>,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        Self {
            http,
            calendar_id: calendar_id.into(),
            credentials,
        }
    }

    /// `calendars/{id}/events` with the id percent-encoded as one segment.
    fn events_url(&self) -> Result<String, HttpError> {
        let mut url = self.http.base().clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::Url(format!("cannot-be-a-base URL: {}", self.http.base())))?
            .pop_if_empty()
            .extend(["calendars", self.calendar_id.as_str(), "events"]);
        Ok(url.to_string())
    }

    async fn insert(&self, url: &str, body: &InsertEvent<'_>) -> Result<InsertedEvent, RegistrarError> {
        let bearer = self.credentials.bearer()?;
        let created = self
            .http
            .post_json_opts(
                url,
                body,
                RequestOpts {
                    auth: Some(Auth::Bearer(bearer)),
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;
        Ok(created)
    }
}

#[async_trait]
impl Registrar for GoogleCalendarRegistrar {
    async fn register(
        &mut self,
        event: &EventRegistration,
    ) -> Result<RegistrationReceipt, RegistrarError> {
        self.credentials.ensure_valid().await?;

        let url = self.events_url()?;
        let body = InsertEvent {
            summary: &event.title,
            start: AllDay { date: event.date },
            end: AllDay { date: event.date },
        };

        let created = match self.insert(&url, &body).await {
            Err(RegistrarError::Http(err)) if err.status() == Some(HttpStatus::UNAUTHORIZED) => {
                tracing::warn!(calendar = %self.calendar_id, "registrar.google.unauthorized");
                self.credentials.refresh().await?;
                self.insert(&url, &body).await?
            }
            other => other?,
        };

        tracing::info!(
            calendar = %self.calendar_id,
            date = %event.date,
            id = created.id.as_deref().unwrap_or(""),
            "registrar.google.inserted"
        );
        Ok(RegistrationReceipt {
            id: created.id,
            link: created.html_link,
        })
    }

    fn name(&self) -> &'static str {
        "google_calendar"
    }
}
