//! Minimal HTTP client with safe logging, retries, and flexible auth.
//!
//! - Request options: headers, `Auth`, timeout, retries
//! - JSON and `application/x-www-form-urlencoded` bodies
//! - Never logs secret values (bearer tokens, secret headers, form fields)
//! - Retries network errors, 429 and 5xx with exponential backoff and `Retry-After`
//! - Optional raw response logging via `PROMO_HTTP_RAW=1` (target `http.raw`)
//!
//! Example (no_run):
//! ```rust
//! # async fn demo() -> Result<(), promo_http::HttpError> {
//! let client = promo_http::HttpClient::new("https://hooks.example.com")?;
//! let body = serde_json::json!({ "title": "Half-price rooms", "date": "2024-12-25" });
//! client
//!     .post_json_discard("promo", &body, promo_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

pub use reqwest::StatusCode as HttpStatus;

const RAW_ENV: &str = "PROMO_HTTP_RAW";
const RAW_MAX_BODY: usize = 64 * 1024;
const SNIPPET_MAX: usize = 500;

fn raw_enabled() -> bool {
    matches!(
        env::var(RAW_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("decode error: {0}, body_snippet: {1}")]
    Decode(String, String),
    #[error("server returned error {status}: {message}, request_id={request_id}")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// HTTP status for server-side failures, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ==============================
// Auth & Request Options
// ==============================

/// Authentication strategies supported by the HTTP client helpers.
///
/// ```
/// use promo_http::Auth;
///
/// let auth = Auth::secret_header("X-Webhook-Secret", "s3cret").unwrap();
/// assert!(matches!(auth, Auth::Header { .. }));
/// ```
#[derive(Clone, Debug)]
pub enum Auth<'a> {
    /// Authorization: Bearer <token>
    Bearer(&'a str),
    /// Shared secret carried in a custom header; the value is marked sensitive.
    Header {
        name: HeaderName,
        value: HeaderValue,
    },
    None,
}

impl Auth<'_> {
    /// Build a header auth from plain strings, rejecting invalid header text.
    pub fn secret_header(name: &str, secret: &str) -> Result<Self, HttpError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Build(format!("invalid header name {name:?}: {e}")))?;
        let mut value = HeaderValue::from_str(secret.trim())
            .map_err(|e| HttpError::Build(format!("invalid secret header value: {e}")))?;
        value.set_sensitive(true);
        Ok(Self::Header { name, value })
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer",
            Self::Header { .. } => "header",
            Self::None => "none",
        }
    }
}

/// Per-request tuning knobs for the HTTP client.
///
/// ```
/// use promo_http::{Auth, RequestOpts};
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     retries: Some(0),
///     auth: Some(Auth::Bearer("token")),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.allow_absolute == false);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub headers: Option<HeaderMap>,
    /// If true and `path` is an absolute URL, use it as-is (ignore base).
    pub allow_absolute: bool,
}

enum Body {
    Json(Vec<u8>),
    Form(String),
}

impl Body {
    fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => "application/json",
            Self::Form(_) => "application/x-www-form-urlencoded",
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Self::Json(b) => b.clone(),
            Self::Form(s) => s.as_bytes().to_vec(),
        }
    }
}

struct RawResponse {
    status: StatusCode,
    bytes: Vec<u8>,
    req_id: String,
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use promo_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("https://www.googleapis.com/calendar/v3/")?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 2);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: Duration::from_secs(15),
            max_retries: 2,
        })
    }

    /// Override the default timeout returned by [`HttpClient::new`].
    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// Override the default retry budget returned by [`HttpClient::new`].
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    /// The base URL every relative path is joined onto.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// POST JSON and decode a JSON response.
    pub async fn post_json_opts<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_vec(body).map_err(|e| HttpError::Build(e.to_string()))?;
        let raw = self
            .request_internal(Method::POST, path, Some(Body::Json(body)), opts)
            .await?;
        decode_json(raw)
    }

    /// POST JSON where only the status matters; the response body is ignored.
    pub async fn post_json_discard<B>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<StatusCode, HttpError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(body).map_err(|e| HttpError::Build(e.to_string()))?;
        let raw = self
            .request_internal(Method::POST, path, Some(Body::Json(body)), opts)
            .await?;
        Ok(raw.status)
    }

    /// POST a url-encoded form (OAuth token endpoints) and decode a JSON response.
    pub async fn post_form_opts<F, T>(
        &self,
        path: &str,
        form: &F,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let encoded = encode_form(form)?;
        let raw = self
            .request_internal(Method::POST, path, Some(Body::Form(encoded)), opts)
            .await?;
        decode_json(raw)
    }

    fn resolve(&self, path: &str, allow_absolute: bool) -> Result<Url, HttpError> {
        if allow_absolute {
            if let Ok(abs) = Url::parse(path) {
                return Ok(abs);
            }
        }
        self.base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    async fn request_internal(
        &self,
        method: Method,
        path: &str,
        body: Option<Body>,
        opts: RequestOpts<'_>,
    ) -> Result<RawResponse, HttpError> {
        let url = self.resolve(path, opts.allow_absolute)?;
        let max_retries = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let auth_kind = opts.auth.as_ref().map(Auth::kind).unwrap_or("none");
        let mut attempt = 0usize;

        let bearer = match &opts.auth {
            Some(Auth::Bearer(tok)) => Some(sanitize_bearer(tok)?),
            _ => None,
        };

        loop {
            let mut rb = self
                .inner
                .request(method.clone(), url.clone())
                .timeout(timeout);

            if let Some(b) = &body {
                rb = rb
                    .header(reqwest::header::CONTENT_TYPE, b.content_type())
                    .body(b.bytes());
            }
            if let Some(hdrs) = &opts.headers {
                rb = rb.headers(hdrs.clone());
            }
            if let Some(tok) = &bearer {
                rb = rb.bearer_auth(tok);
            }
            if let Some(Auth::Header { name, value }) = &opts.auth {
                rb = rb.header(name, value);
            }

            let req_id = format!(
                "r{:x}",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
            );
            let attempt0 = attempt + 1;

            tracing::debug!(
                req_id=%req_id,
                attempt=attempt0,
                max_retries,
                method=%method,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                timeout_ms=timeout.as_millis() as u64,
                auth_kind,
                has_body=%body.is_some(),
                "http.request.start"
            );

            let t0 = std::time::Instant::now();
            let sent = match rb.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    resp.bytes()
                        .await
                        .map(|b| (status, headers, b.to_vec()))
                }
                Err(err) => Err(err),
            };

            let (status, headers, bytes) = match sent {
                Ok(parts) => parts,
                Err(err) => {
                    let message = err.to_string();
                    if attempt < max_retries {
                        attempt += 1;
                        let delay = backoff(attempt);
                        tracing::warn!(
                            req_id=%req_id,
                            attempt,
                            max_retries,
                            backoff_ms=delay.as_millis() as u64,
                            message=%message,
                            "http.retrying.network"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    tracing::warn!(req_id=%req_id, attempt, message=%message, "http.network_error");
                    return Err(HttpError::Network(message));
                }
            };
            let dur_ms = t0.elapsed().as_millis() as u64;

            let req_hdr_id = headers
                .get("x-request-id")
                .or_else(|| headers.get("x-goog-request-id"))
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string();

            tracing::debug!(
                req_id=%req_id,
                %status,
                duration_ms=dur_ms,
                body_len=bytes.len(),
                x_request_id=%req_hdr_id,
                "http.response.headers"
            );

            if raw_enabled() {
                let truncated = bytes.len() > RAW_MAX_BODY;
                let shown = &bytes[..bytes.len().min(RAW_MAX_BODY)];
                tracing::info!(
                    target: "http.raw",
                    %req_id,
                    status=%status,
                    duration_ms=dur_ms,
                    body=%String::from_utf8_lossy(shown),
                    truncated
                );
            }

            if status.is_success() {
                return Ok(RawResponse {
                    status,
                    bytes,
                    req_id,
                });
            }

            let message = extract_error_message(&bytes);
            let is_429 = status == StatusCode::TOO_MANY_REQUESTS;
            let is_5xx = status.is_server_error();

            if (is_429 || is_5xx) && attempt < max_retries {
                attempt += 1;
                let delay = match retry_after_delay_secs(&headers) {
                    Some(secs) => Duration::from_secs(secs),
                    None if is_429 => backoff(attempt).max(Duration::from_millis(1100)),
                    None => backoff(attempt),
                };
                tracing::warn!(
                    req_id=%req_id,
                    %status,
                    attempt,
                    max_retries,
                    backoff_ms=delay.as_millis() as u64,
                    message=%message,
                    "http.retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::warn!(
                req_id=%req_id,
                %status,
                message=%message,
                x_request_id=%req_hdr_id,
                "http.error"
            );
            return Err(HttpError::Api {
                status,
                message,
                request_id: req_hdr_id,
            });
        }
    }
}

// ==============================
// Helpers
// ==============================

fn backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    Duration::from_millis(200u64.saturating_mul(1u64 << shift))
}

fn decode_json<T: DeserializeOwned>(raw: RawResponse) -> Result<T, HttpError> {
    serde_json::from_slice::<T>(&raw.bytes).map_err(|e| {
        let snippet = snip_body(&raw.bytes);
        tracing::warn!(
            req_id=%raw.req_id,
            serde_err=%e,
            body_snippet=%snippet,
            "http.response.decode_error"
        );
        HttpError::Decode(e.to_string(), snippet)
    })
}

fn encode_form<F: Serialize + ?Sized>(form: &F) -> Result<String, HttpError> {
    let value = serde_json::to_value(form).map_err(|e| HttpError::Build(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| HttpError::Build("form body must serialize to an object".into()))?;
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in obj {
        match v {
            serde_json::Value::Null => {}
            serde_json::Value::String(s) => {
                ser.append_pair(k, s);
            }
            other => {
                ser.append_pair(k, &other.to_string());
            }
        }
    }
    Ok(ser.finish())
}

fn extract_error_message(body: &[u8]) -> String {
    // Google APIs: {"error":{"code":403,"message":"...","status":"PERMISSION_DENIED"}}
    #[derive(Deserialize)]
    struct GoogleEnv {
        error: GoogleDetail,
    }
    #[derive(Deserialize)]
    struct GoogleDetail {
        message: String,
    }

    // OAuth token endpoint: {"error":"invalid_grant","error_description":"..."}
    #[derive(Deserialize)]
    struct OAuthErr {
        error: String,
        #[serde(default)]
        error_description: String,
    }

    #[derive(Deserialize)]
    struct Msg {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
    }

    if let Ok(env) = serde_json::from_slice::<GoogleEnv>(body) {
        return env.error.message;
    }
    if let Ok(oauth) = serde_json::from_slice::<OAuthErr>(body) {
        if oauth.error_description.is_empty() {
            return oauth.error;
        }
        return format!("{}: {}", oauth.error, oauth.error_description);
    }
    if let Ok(m) = serde_json::from_slice::<Msg>(body) {
        if !m.message.is_empty() {
            return m.message;
        }
        if !m.detail.is_empty() {
            return m.detail;
        }
    }
    snip_body(body)
}

fn retry_after_delay_secs(h: &HeaderMap) -> Option<u64> {
    h.get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())?
        .parse()
        .ok()
}

fn snip_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > SNIPPET_MAX {
        let mut snip: String = text.chars().take(SNIPPET_MAX).collect();
        snip.push_str("...");
        snip
    } else {
        text.into_owned()
    }
}

fn sanitize_bearer(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();
    s.retain(|ch| !ch.is_ascii_whitespace());

    if s.is_empty() {
        return Err(HttpError::Build("bearer token is empty".into()));
    }
    if !s.is_ascii() {
        return Err(HttpError::Build("bearer token contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "bearer token contains control characters".into(),
        ));
    }
    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn google_error_message_is_extracted() {
        let body = br#"{"error":{"code":404,"message":"Not Found","status":"NOT_FOUND"}}"#;
        assert_eq!(extract_error_message(body), "Not Found");
    }

    #[test]
    fn oauth_error_includes_description() {
        let body = br#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#;
        assert_eq!(
            extract_error_message(body),
            "invalid_grant: Token has been expired or revoked."
        );
    }

    #[test]
    fn plain_text_error_falls_back_to_snippet() {
        assert_eq!(extract_error_message(b"forbidden"), "forbidden");
    }

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let long = "半".repeat(600);
        let snip = snip_body(long.as_bytes());
        assert!(snip.ends_with("..."));
        assert_eq!(snip.chars().count(), SNIPPET_MAX + 3);
    }

    #[test]
    fn bearer_is_trimmed_and_unquoted() {
        assert_eq!(sanitize_bearer(" \"ya29.abc\"\n").unwrap(), "ya29.abc");
        assert!(sanitize_bearer("   ").is_err());
        assert!(sanitize_bearer("トークン").is_err());
    }

    #[test]
    fn form_encoding_skips_nulls_and_escapes() {
        let form = json!({
            "grant_type": "refresh_token",
            "refresh_token": "1//a b",
            "scope": null
        });
        let encoded = encode_form(&form).unwrap();
        assert!(encoded.contains("grant_type=refresh_token"));
        assert!(encoded.contains("refresh_token=1%2F%2Fa+b"));
        assert!(!encoded.contains("scope"));
    }

    #[test]
    fn backoff_grows_and_saturates() {
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(400));
        assert!(backoff(100) >= backoff(17));
    }
}
