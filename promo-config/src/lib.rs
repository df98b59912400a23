//! Loader for promo-watch configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are added, later sources winning:
//! files (or inline YAML) first, then `PROMO_`-prefixed environment variables
//! where `__` separates nesting levels (`PROMO_PAGE__URL`, `PROMO_LOG__LEVEL`).
//! After merging, every string value has `${VAR}` placeholders expanded so a
//! YAML file can keep secrets out of the repository:
//!
//! ```yaml
//! page:
//!   url: "${PAGE_URL}"
//!   user_agent: "${USER_AGENT}"
//! event:
//!   title: "${EVENT_TITLE}"
//! registrar:
//!   kind: google_calendar
//!   calendar_id: "${CALENDAR_ID}"
//! ```
use config::{Config, ConfigError, Environment, File};
use promo_common::{LogFormat, LogLevel, MarkerScope, StopPolicy};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const ENV_PREFIX: &str = "PROMO";
const APP_DIR: &str = "promo-watch";
const CONFIG_FILE_NAME: &str = "promo-watch.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct PromoConfig {
    pub page: PageConfig,
    pub event: EventConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub registrar: RegistrarConfig,
    #[serde(default)]
    pub log: LogSettings,
}

/// The scraped page and the browser session used to render it.
#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(deserialize_with = "text")]
    pub url: String,
    /// Href prefix of the per-post permalink that carries the timestamp text.
    /// Defaults to `<url>/posts/`.
    #[serde(default, deserialize_with = "optional_text")]
    pub post_link_prefix: Option<String>,
    #[serde(default = "default_user_agent", deserialize_with = "text")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_webdriver_url", deserialize_with = "text")]
    pub webdriver_url: String,
    #[serde(default = "default_locale", deserialize_with = "text")]
    pub locale: String,
    #[serde(default = "default_page_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

impl PageConfig {
    pub fn post_link_prefix(&self) -> String {
        match &self.post_link_prefix {
            Some(prefix) => prefix.clone(),
            None => format!("{}/posts/", self.url.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventConfig {
    /// Title of the registered calendar entry.
    #[serde(deserialize_with = "text")]
    pub title: String,
    /// Phrase that must follow the month/day in an announcement.
    #[serde(default = "default_keyword", deserialize_with = "text")]
    pub keyword: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub marker_scope: MarkerScope,
    #[serde(default)]
    pub stop_policy: StopPolicy,
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_scan_retries")]
    pub retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            marker_scope: MarkerScope::default(),
            stop_policy: StopPolicy::default(),
            max_fragments: default_max_fragments(),
            utc_offset_hours: default_utc_offset_hours(),
            retries: default_scan_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// The tag is `kind`; the remaining keys configure that registrar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistrarConfig {
    GoogleCalendar {
        #[serde(deserialize_with = "text")]
        calendar_id: String,
        /// Pre-issued OAuth access token; takes precedence over `credentials_file`.
        #[serde(default, deserialize_with = "optional_text")]
        access_token: Option<String>,
        #[serde(default = "default_credentials_file")]
        credentials_file: PathBuf,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_http_retries")]
        retries: usize,
    },
    Webhook {
        #[serde(deserialize_with = "text")]
        endpoint: String,
        #[serde(deserialize_with = "text")]
        secret: String,
        #[serde(default = "default_secret_header", deserialize_with = "text")]
        secret_header: String,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_http_retries")]
        retries: usize,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// A scalar as YAML or a parsed env var may present it. Free-text fields
/// accept all of them so `PROMO_REGISTRAR__SECRET=123456` stays a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Flag(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(s) => s,
            Scalar::Signed(n) => n.to_string(),
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Scalar::deserialize(deserializer).map(String::from)
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into()
}
fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_locale() -> String {
    "ja-JP".into()
}
fn default_page_timeout_secs() -> u64 {
    10
}
fn default_max_posts() -> usize {
    19
}
fn default_viewport_width() -> u32 {
    500
}
fn default_viewport_height() -> u32 {
    5000
}
fn default_keyword() -> String {
    "室料半額".into()
}
fn default_max_fragments() -> usize {
    40
}
fn default_utc_offset_hours() -> i32 {
    9
}
fn default_scan_retries() -> usize {
    2
}
fn default_retry_delay_ms() -> u64 {
    2000
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from("event.log")
}
fn default_credentials_file() -> PathBuf {
    PathBuf::from("token.json")
}
fn default_http_timeout_secs() -> u64 {
    15
}
fn default_http_retries() -> usize {
    2
}
fn default_secret_header() -> String {
    "X-Webhook-Secret".into()
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Locations probed when no explicit `--config` is given, in merge order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_DIR).join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    paths
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct PromoConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for PromoConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PromoConfigLoader {
    /// Start empty; `PROMO_` environment overrides are applied last in [`load`](Self::load).
    ///
    /// ```
    /// use promo_config::{PromoConfigLoader, RegistrarConfig};
    ///
    /// let config = PromoConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// page:
    ///   url: "https://www.facebook.com/karaoke.example"
    /// event:
    ///   title: "Half-price rooms"
    /// registrar:
    ///   kind: webhook
    ///   endpoint: "https://hooks.example.com/promo"
    ///   secret: "s3cret"
    /// "#)
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.page.max_posts, 19);
    /// assert_eq!(config.event.keyword, "室料半額");
    /// assert!(matches!(config.registrar, RegistrarConfig::Webhook { .. }));
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: ENV_PREFIX,
        }
    }

    /// Use a different environment prefix (tests use this to avoid clashes).
    pub fn with_env_prefix(mut self, prefix: &'static str) -> Self {
        self.env_prefix = prefix;
        self
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so deployments can rely purely on
    /// environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// ```
    /// use promo_config::{PromoConfigLoader, RegistrarConfig};
    ///
    /// unsafe { std::env::set_var("DOCTEST_CALENDAR_ID", "team@group.calendar.google.com"); }
    ///
    /// let config = PromoConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// page:
    ///   url: "https://www.facebook.com/karaoke.example/"
    /// event:
    ///   title: "Half-price rooms"
    /// registrar:
    ///   kind: google_calendar
    ///   calendar_id: "${DOCTEST_CALENDAR_ID}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(
    ///     config.page.post_link_prefix(),
    ///     "https://www.facebook.com/karaoke.example/posts/"
    /// );
    /// match &config.registrar {
    ///     RegistrarConfig::GoogleCalendar { calendar_id, timeout_secs, .. } => {
    ///         assert_eq!(calendar_id, "team@group.calendar.google.com");
    ///         assert_eq!(*timeout_secs, 15);
    ///     }
    ///     _ => panic!("expected Google Calendar registrar"),
    /// }
    ///
    /// unsafe { std::env::remove_var("DOCTEST_CALENDAR_ID"); }
    /// ```
    pub fn load(self) -> Result<PromoConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Convert to serde_json::Value first
        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: PromoConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}
