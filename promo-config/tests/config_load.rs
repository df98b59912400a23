use promo_common::{LogLevel, MarkerScope, StopPolicy};
use promo_config::{PromoConfigLoader, RegistrarConfig};
use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
page:
  url: "${PAGE_URL}"
  user_agent: "${USER_AGENT}"
  headless: true
event:
  title: "${EVENT_TITLE}"
scan:
  marker_scope: until_next_marker
  stop_policy: until_past_event
registrar:
  kind: google_calendar
  calendar_id: "${CALENDAR_ID}"
log:
  level: WARNING
"#;

#[test]
#[serial]
fn test_config_load_with_env_placeholders() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "promo-watch.yaml", FILE_YAML);

    temp_env::with_vars(
        [
            ("PAGE_URL", Some("https://www.facebook.com/karaoke.example/")),
            ("USER_AGENT", Some("promo-test-agent")),
            ("EVENT_TITLE", Some("Half-price rooms")),
            ("CALENDAR_ID", Some("primary")),
        ],
        || {
            let config = PromoConfigLoader::new()
                .with_env_prefix("PROMO_IT_PLACEHOLDERS")
                .with_file(&p)
                .load()
                .expect("load system config");

            assert_eq!(config.page.url, "https://www.facebook.com/karaoke.example/");
            assert_eq!(config.page.user_agent, "promo-test-agent");
            assert_eq!(config.event.title, "Half-price rooms");
            assert_eq!(config.scan.marker_scope, MarkerScope::UntilNextMarker);
            assert_eq!(config.scan.stop_policy, StopPolicy::UntilPastEvent);
            assert_eq!(config.log.level, LogLevel::Warning);
            assert!(matches!(
                config.registrar,
                RegistrarConfig::GoogleCalendar { ref calendar_id, .. } if calendar_id == "primary"
            ));
        },
    );
}

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(
        &tmp,
        "promo-watch.yaml",
        r#"
page:
  url: "https://www.facebook.com/karaoke.example"
  headless: true
event:
  title: "Half-price rooms"
registrar:
  kind: webhook
  endpoint: "https://hooks.example.com/promo"
  secret: "from-file"
"#,
    );

    temp_env::with_vars(
        [
            ("PROMO_IT_OVERRIDE_PAGE__HEADLESS", Some("false")),
            ("PROMO_IT_OVERRIDE_PAGE__MAX_POSTS", Some("5")),
            ("PROMO_IT_OVERRIDE_REGISTRAR__SECRET", Some("from-env")),
            ("PROMO_IT_OVERRIDE_LOG__LEVEL", Some("debug")),
        ],
        || {
            let config = PromoConfigLoader::new()
                .with_env_prefix("PROMO_IT_OVERRIDE")
                .with_file(&p)
                .load()
                .expect("load with env overrides");

            assert!(!config.page.headless);
            assert_eq!(config.page.max_posts, 5);
            assert_eq!(config.log.level, LogLevel::Debug);
            match config.registrar {
                RegistrarConfig::Webhook { secret, .. } => assert_eq!(secret, "from-env"),
                other => panic!("unexpected registrar: {other:?}"),
            }
        },
    );
}

#[test]
#[serial]
fn test_missing_optional_file_is_ignored() {
    let tmp = TempDir::new().unwrap();
    let absent = tmp.path().join("nope.yaml");

    let config = PromoConfigLoader::new()
        .with_env_prefix("PROMO_IT_OPTIONAL")
        .with_optional_file(&absent)
        .with_yaml_str(
            r#"
page:
  url: "https://www.facebook.com/karaoke.example"
event:
  title: "Half-price rooms"
registrar:
  kind: webhook
  endpoint: "https://hooks.example.com/promo"
  secret: "s"
"#,
        )
        .load()
        .expect("optional file may be absent");

    assert_eq!(config.page.locale, "ja-JP");
}

#[test]
#[serial]
fn test_missing_required_file_fails() {
    let tmp = TempDir::new().unwrap();
    let absent = tmp.path().join("nope.yaml");

    let result = PromoConfigLoader::new()
        .with_env_prefix("PROMO_IT_REQUIRED")
        .with_file(&absent)
        .load();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_numeric_scalars_load_as_text_and_lenient_level() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(
        &tmp,
        "promo-watch.yaml",
        r#"
page:
  url: "https://www.facebook.com/karaoke.example"
event:
  title: "Half-price rooms"
registrar:
  kind: webhook
  endpoint: "https://hooks.example.com/promo"
  secret: 42
log:
  level: 10
"#,
    );

    let from_file = PromoConfigLoader::new()
        .with_env_prefix("PROMO_IT_NUMERIC_FILE")
        .with_file(&p)
        .load()
        .expect("numeric level and secret in YAML");
    assert_eq!(from_file.log.level, LogLevel::Info);
    match from_file.registrar {
        RegistrarConfig::Webhook { secret, .. } => assert_eq!(secret, "42"),
        other => panic!("unexpected registrar: {other:?}"),
    }

    temp_env::with_vars(
        [
            ("PROMO_IT_NUMERIC_ENV_LOG__LEVEL", Some("5")),
            ("PROMO_IT_NUMERIC_ENV_REGISTRAR__SECRET", Some("123456")),
        ],
        || {
            let config = PromoConfigLoader::new()
                .with_env_prefix("PROMO_IT_NUMERIC_ENV")
                .with_file(&p)
                .load()
                .expect("numeric env overrides");

            assert_eq!(config.log.level, LogLevel::Info);
            match config.registrar {
                RegistrarConfig::Webhook { secret, .. } => assert_eq!(secret, "123456"),
                other => panic!("unexpected registrar: {other:?}"),
            }
        },
    );
}
