use async_trait::async_trait;
use chrono::NaiveDate;
use promo_http::{Auth, HttpClient, RequestOpts};
use serde::Serialize;

use super::{EventRegistration, Registrar, RegistrarError, RegistrationReceipt};

pub const DEFAULT_SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Debug, Serialize)]
struct Payload<'a> {
    title: &'a str,
    date: NaiveDate,
}

/// POSTs `{title, date}` to an endpoint that authenticates with a shared secret.
pub struct WebhookRegistrar {
    http: HttpClient,
    endpoint: String,
    secret_header: String,
    secret: String,
}

impl WebhookRegistrar {
    /// `endpoint` may be absolute or relative to the client's base URL.
    pub fn new(http: HttpClient, endpoint: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            secret_header: DEFAULT_SECRET_HEADER.to_string(),
            secret: secret.into(),
        }
    }

    pub fn with_secret_header(mut self, header: impl Into<String>) -> Self {
        self.secret_header = header.into();
        self
    }
}

#[async_trait]
impl Registrar for WebhookRegistrar {
    async fn register(
        &mut self,
        event: &EventRegistration,
    ) -> Result<RegistrationReceipt, RegistrarError> {
        let auth = if self.secret.trim().is_empty() {
            Auth::None
        } else {
            Auth::secret_header(&self.secret_header, &self.secret)?
        };
        let payload = Payload {
            title: &event.title,
            date: event.date,
        };
        let status = self
            .http
            .post_json_discard(
                &self.endpoint,
                &payload,
                RequestOpts {
                    auth: Some(auth),
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;
        if !status.is_success() {
            return Err(RegistrarError::Rejected(status.as_u16()));
        }
        tracing::info!(date = %event.date, status = status.as_u16(), "registrar.webhook.delivered");
        Ok(RegistrationReceipt::default())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
