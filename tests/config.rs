use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use atemate::config::{Config, DEFAULT_AUTH_ENDPOINT, DEFAULT_FIRESTORE_ENDPOINT};
use atemate::dispatch::gemini;
use atemate::dispatch::retry::{Backoff, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use atemate::error::AtemateError;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_without_file() {
    let config = Config::default();

    assert_eq!(config.gemini.endpoint, gemini::DEFAULT_ENDPOINT);
    assert!(config.gemini.api_key.is_empty());
    assert_eq!(config.gemini.request_timeout, gemini::DEFAULT_REQUEST_TIMEOUT);
    assert_eq!(config.retry.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.retry.retry_delay, DEFAULT_RETRY_DELAY);
    assert_eq!(config.retry.backoff, Backoff::Fixed);
    assert!(config.firebase.is_none());
}

#[test]
fn toml_overrides_every_section() {
    let config = Config::from_toml_str(
        r#"
        [gemini]
        endpoint = "http://localhost:9000/generate"
        api_key = "file-key"
        request_timeout_ms = 1500

        [retry]
        max_retries = 5
        retry_delay_ms = 250
        backoff = { kind = "exponential", max_delay_ms = 4000 }

        [nutrition]
        app_id = "nid"
        app_key = "nkey"

        [firebase]
        api_key = "fb"
        project_id = "atemate-dev"
        "#,
    )
    .unwrap();

    assert_eq!(config.gemini.endpoint, "http://localhost:9000/generate");
    assert_eq!(config.gemini.api_key, "file-key");
    assert_eq!(config.gemini.request_timeout, Duration::from_millis(1500));
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.retry_delay, Duration::from_millis(250));
    assert_eq!(
        config.retry.backoff,
        Backoff::Exponential {
            max_delay: Duration::from_secs(4)
        }
    );
    assert_eq!(config.nutrition.app_id.as_deref(), Some("nid"));

    let firebase = config.firebase.unwrap();
    assert_eq!(firebase.project_id, "atemate-dev");
    assert_eq!(firebase.auth_endpoint, DEFAULT_AUTH_ENDPOINT);
    assert_eq!(firebase.firestore_endpoint, DEFAULT_FIRESTORE_ENDPOINT);
}

#[test]
fn partial_firebase_section_selects_local_backend() {
    let config = Config::from_toml_str("[firebase]\napi_key = \"fb\"\n").unwrap();
    assert!(config.firebase.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Config::from_toml_str("[gemini]\nmodel = \"x\"\n").unwrap_err();
    assert!(matches!(err, AtemateError::Config(_)), "got {err:?}");
}

#[test]
fn environment_wins_over_file() {
    let mut config = Config::from_toml_str("[gemini]\napi_key = \"file-key\"\n").unwrap();
    config.apply_env(env(&[
        ("GEMINI_API_KEY", "env-key"),
        ("NUTRITION_APP_KEY", "env-nkey"),
        ("FIREBASE_API_KEY", "fb"),
        ("FIREBASE_PROJECT_ID", "prod"),
    ]));

    assert_eq!(config.gemini.api_key, "env-key");
    assert_eq!(config.nutrition.app_key.as_deref(), Some("env-nkey"));
    assert_eq!(config.firebase.map(|f| f.project_id).as_deref(), Some("prod"));
}

#[test]
fn lone_firebase_variable_is_ignored() {
    let mut config = Config::default();
    config.apply_env(env(&[("FIREBASE_PROJECT_ID", "prod")]));
    assert!(config.firebase.is_none());
}

#[test]
fn reads_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[retry]\nmax_retries = 7").unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.retry.max_retries, 7);
}

#[test]
fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = Config::from_file(&path).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn debug_output_redacts_secrets() {
    let mut config = Config::default();
    config.apply_env(env(&[
        ("GEMINI_API_KEY", "super-secret"),
        ("NUTRITION_APP_KEY", "also-secret"),
        ("FIREBASE_API_KEY", "fb-secret"),
        ("FIREBASE_PROJECT_ID", "prod"),
    ]));

    let rendered = format!("{config:?}");
    assert!(!rendered.contains("super-secret"));
    assert!(!rendered.contains("also-secret"));
    assert!(!rendered.contains("fb-secret"));
    assert!(rendered.contains("prod"));
}
