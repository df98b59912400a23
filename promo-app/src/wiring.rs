//! Builds runtime collaborators from the loaded configuration.
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset, Utc};
use promo_calendar::{
    AuthorizedUserFile, CredentialProvider, GoogleCalendarRegistrar, Registrar, StaticToken,
    WebhookRegistrar, registrar::google::CALENDAR_API_BASE,
};
use promo_common::retry::{RetryPolicy, retry_fixed};
use promo_config::{PageConfig, PromoConfig, RegistrarConfig};
use promo_drivers::browser::{BrowserDriver, DriverOptions};
use promo_http::HttpClient;
use promo_social::facebook::{FacebookFeed, FeedSelectors};
use promo_social::timestamp::fixed_zone;

use crate::scan::ScanOptions;

const OAUTH_BASE: &str = "https://oauth2.googleapis.com/";

pub fn driver_options(page: &PageConfig) -> DriverOptions {
    DriverOptions {
        webdriver_url: page.webdriver_url.clone(),
        headless: page.headless,
        user_agent: page.user_agent.clone(),
        locale: page.locale.clone(),
        viewport: (page.viewport_width, page.viewport_height),
        timeout: Duration::from_secs(page.timeout_secs),
        ..DriverOptions::default()
    }
}

pub fn retry_policy(cfg: &PromoConfig) -> RetryPolicy {
    RetryPolicy::new(cfg.scan.retries, Duration::from_millis(cfg.scan.retry_delay_ms))
}

/// `now` in the configured fixed zone. An RFC 3339 override is converted into that zone.
pub fn resolve_now(cfg: &PromoConfig, now_override: Option<&str>) -> Result<DateTime<FixedOffset>> {
    let zone = fixed_zone(cfg.scan.utc_offset_hours)
        .with_context(|| format!("scan.utc_offset_hours {} is out of range", cfg.scan.utc_offset_hours))?;
    match now_override {
        Some(raw) => {
            let parsed = DateTime::parse_from_rfc3339(raw.trim())
                .with_context(|| format!("--now {raw:?} is not an RFC 3339 timestamp"))?;
            Ok(parsed.with_timezone(&zone))
        }
        None => Ok(Utc::now().with_timezone(&zone)),
    }
}

pub fn scan_options(cfg: &PromoConfig, now: DateTime<FixedOffset>, dry_run: bool) -> ScanOptions {
    ScanOptions {
        scope: cfg.scan.marker_scope,
        stop_policy: cfg.scan.stop_policy,
        max_fragments: cfg.scan.max_fragments,
        now,
        title: cfg.event.title.clone(),
        dry_run,
    }
}

pub fn build_registrar(cfg: &RegistrarConfig) -> Result<Box<dyn Registrar>> {
    match cfg {
        RegistrarConfig::GoogleCalendar {
            calendar_id,
            access_token,
            credentials_file,
            timeout_secs,
            retries,
        } => {
            if calendar_id.trim().is_empty() {
                bail!("registrar.calendar_id must not be empty");
            }
            let credentials: Box<dyn CredentialProvider> = match access_token
                .as_deref()
                .filter(|t| !t.trim().is_empty())
            {
                Some(token) => Box::new(StaticToken::new(token)),
                None => {
                    let oauth = HttpClient::new(OAUTH_BASE)?
                        .with_timeout(Duration::from_secs(*timeout_secs))
                        .with_retries(*retries);
                    Box::new(AuthorizedUserFile::load(credentials_file, oauth).with_context(
                        || format!("loading credentials from {}", credentials_file.display()),
                    )?)
                }
            };
            let http = HttpClient::new(CALENDAR_API_BASE)?
                .with_timeout(Duration::from_secs(*timeout_secs))
                .with_retries(*retries);
            Ok(Box::new(GoogleCalendarRegistrar::new(
                http,
                calendar_id.trim(),
                credentials,
            )))
        }
        RegistrarConfig::Webhook {
            endpoint,
            secret,
            secret_header,
            timeout_secs,
            retries,
        } => {
            let http = HttpClient::new(endpoint)
                .with_context(|| format!("registrar.endpoint {endpoint:?} is not a URL"))?
                .with_timeout(Duration::from_secs(*timeout_secs))
                .with_retries(*retries);
            Ok(Box::new(
                WebhookRegistrar::new(http, endpoint.clone(), secret.clone())
                    .with_secret_header(secret_header.clone()),
            ))
        }
    }
}

/// Start the browser and open the page, retrying transient WebDriver failures.
pub async fn open_feed(cfg: &PromoConfig) -> Result<(BrowserDriver, FacebookFeed)> {
    let retry = retry_policy(cfg);
    let options = driver_options(&cfg.page);
    let driver = retry_fixed("browser.start", retry, |_| BrowserDriver::new(options.clone()))
        .await
        .with_context(|| format!("cannot start a browser session at {}", cfg.page.webdriver_url))?;

    let url = cfg.page.url.as_str();
    let driver_ref = &driver;
    let opened = retry_fixed("browser.open", retry, |_| async move { driver_ref.open(url).await }).await;
    let page = match opened {
        Ok(page) => page,
        Err(err) => {
            if let Err(close_err) = driver.close().await {
                tracing::warn!(error = %close_err, "browser.close_failed");
            }
            return Err(err.context(format!("cannot open {url}")));
        }
    };

    let selectors = FeedSelectors::for_page(&cfg.page.post_link_prefix());
    let feed = FacebookFeed::new(page, selectors, cfg.page.max_posts, retry);
    Ok((driver, feed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promo_config::PromoConfigLoader;

    fn config(registrar: &str) -> PromoConfig {
        PromoConfigLoader::new()
            .with_env_prefix("PROMO_WIRING_TEST")
            .with_yaml_str(&format!(
                "page:\n  url: \"https://www.facebook.com/karaoke.example\"\n  headless: false\nevent:\n  title: \"室料半額デー\"\n{registrar}"
            ))
            .load()
            .unwrap()
    }

    const WEBHOOK: &str = "registrar:\n  kind: webhook\n  endpoint: \"https://hooks.example.com/promo\"\n  secret: \"s\"\n";

    #[test]
    fn driver_options_follow_page_config() {
        let cfg = config(WEBHOOK);
        let opts = driver_options(&cfg.page);
        assert!(!opts.headless);
        assert_eq!(opts.locale, "ja-JP");
        assert_eq!(opts.viewport, (500, 5000));
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert!(opts.block_images);
    }

    #[test]
    fn now_override_is_parsed() {
        let cfg = config(WEBHOOK);
        let now = resolve_now(&cfg, Some("2024-12-20T10:00:00+09:00")).unwrap();
        assert_eq!(now.date_naive().to_string(), "2024-12-20");
        assert!(resolve_now(&cfg, Some("yesterday")).is_err());
    }

    #[test]
    fn now_override_is_shifted_into_configured_zone() {
        let cfg = config(WEBHOOK);
        let now = resolve_now(&cfg, Some("2024-12-20T20:00:00Z")).unwrap();
        assert_eq!(now.offset().local_minus_utc(), 9 * 3600);
        assert_eq!(now.date_naive().to_string(), "2024-12-21");
        assert_eq!(now.format("%H:%M").to_string(), "05:00");
    }

    #[test]
    fn now_defaults_to_configured_zone() {
        let cfg = config(WEBHOOK);
        let now = resolve_now(&cfg, None).unwrap();
        assert_eq!(now.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn builds_webhook_registrar() {
        let registrar = build_registrar(&config(WEBHOOK).registrar).unwrap();
        assert_eq!(registrar.name(), "webhook");
    }

    #[test]
    fn static_token_wins_over_credentials_file() {
        let cfg = config(
            "registrar:\n  kind: google_calendar\n  calendar_id: primary\n  access_token: ya29.x\n  credentials_file: /nonexistent/token.json\n",
        );
        let registrar = build_registrar(&cfg.registrar).unwrap();
        assert_eq!(registrar.name(), "google_calendar");
    }

    #[test]
    fn missing_credentials_file_is_reported() {
        let cfg = config(
            "registrar:\n  kind: google_calendar\n  calendar_id: primary\n  credentials_file: /nonexistent/token.json\n",
        );
        let err = build_registrar(&cfg.registrar).err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/token.json"));
    }

    #[test]
    fn scan_options_carry_title_and_policy() {
        let cfg = config(WEBHOOK);
        let now = resolve_now(&cfg, Some("2024-12-20T10:00:00+09:00")).unwrap();
        let opts = scan_options(&cfg, now, true);
        assert_eq!(opts.title, "室料半額デー");
        assert_eq!(opts.max_fragments, 40);
        assert!(opts.dry_run);
    }
}
