use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::gemini;
use crate::dispatch::nutrition;
use crate::dispatch::retry::{Backoff, RetryPolicy};
use crate::error::AtemateError;

/// Config file consulted when `ATEMATE_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "atemate.toml";

pub const DEFAULT_AUTH_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub retry: RetryPolicy,
    pub nutrition: NutritionConfig,
    /// `None` selects the in-process local backend.
    pub firebase: Option<FirebaseConfig>,
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct NutritionConfig {
    pub endpoint: String,
    pub app_id: Option<String>,
    pub app_key: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub auth_endpoint: String,
    pub firestore_endpoint: String,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl std::fmt::Debug for NutritionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NutritionConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("app_key", &self.app_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("project_id", &self.project_id)
            .field("auth_endpoint", &self.auth_endpoint)
            .field("firestore_endpoint", &self.firestore_endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// --- TOML shape -------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    gemini: RawGemini,
    retry: RawRetry,
    nutrition: RawNutrition,
    firebase: RawFirebase,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawGemini {
    endpoint: Option<String>,
    api_key: Option<String>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRetry {
    max_retries: Option<u32>,
    retry_delay_ms: Option<u64>,
    backoff: Option<Backoff>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawNutrition {
    endpoint: Option<String>,
    app_id: Option<String>,
    app_key: Option<String>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawFirebase {
    api_key: Option<String>,
    project_id: Option<String>,
    auth_endpoint: Option<String>,
    firestore_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

impl Config {
    /// Load `ATEMATE_CONFIG` (or `atemate.toml` if present), then apply
    /// environment overrides. A missing default file is not an error; a
    /// missing explicit file is.
    pub fn load() -> Result<Self, AtemateError> {
        let mut config = match env::var_os("ATEMATE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()));
        config.warn_missing();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AtemateError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AtemateError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| AtemateError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, AtemateError> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| AtemateError::Config(e.to_string()))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let gemini = GeminiConfig {
            endpoint: raw
                .gemini
                .endpoint
                .unwrap_or_else(|| gemini::DEFAULT_ENDPOINT.to_string()),
            api_key: raw.gemini.api_key.unwrap_or_default(),
            request_timeout: raw
                .gemini
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(gemini::DEFAULT_REQUEST_TIMEOUT),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: raw.retry.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: raw
                .retry
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            backoff: raw.retry.backoff.unwrap_or(defaults.backoff),
        };

        let nutrition = NutritionConfig {
            endpoint: raw
                .nutrition
                .endpoint
                .unwrap_or_else(|| nutrition::DEFAULT_ENDPOINT.to_string()),
            app_id: raw.nutrition.app_id,
            app_key: raw.nutrition.app_key,
            request_timeout: raw
                .nutrition
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(nutrition::DEFAULT_REQUEST_TIMEOUT),
        };

        let fb = raw.firebase;
        let firebase = match (fb.api_key, fb.project_id) {
            (Some(api_key), Some(project_id)) => Some(FirebaseConfig {
                api_key,
                project_id,
                auth_endpoint: fb
                    .auth_endpoint
                    .unwrap_or_else(|| DEFAULT_AUTH_ENDPOINT.to_string()),
                firestore_endpoint: fb
                    .firestore_endpoint
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_ENDPOINT.to_string()),
            }),
            _ => None,
        };

        Config {
            gemini,
            retry,
            nutrition,
            firebase,
        }
    }

    /// Environment wins over the file. `lookup` is injected so tests need
    /// not mutate the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Some(endpoint) = lookup("GEMINI_ENDPOINT") {
            self.gemini.endpoint = endpoint;
        }
        if let Some(id) = lookup("NUTRITION_APP_ID") {
            self.nutrition.app_id = Some(id);
        }
        if let Some(key) = lookup("NUTRITION_APP_KEY") {
            self.nutrition.app_key = Some(key);
        }

        let api_key = lookup("FIREBASE_API_KEY");
        let project_id = lookup("FIREBASE_PROJECT_ID");
        match (&mut self.firebase, api_key, project_id) {
            (Some(fb), api_key, project_id) => {
                if let Some(k) = api_key {
                    fb.api_key = k;
                }
                if let Some(p) = project_id {
                    fb.project_id = p;
                }
            }
            (None, Some(api_key), Some(project_id)) => {
                self.firebase = Some(FirebaseConfig {
                    api_key,
                    project_id,
                    auth_endpoint: DEFAULT_AUTH_ENDPOINT.to_string(),
                    firestore_endpoint: DEFAULT_FIRESTORE_ENDPOINT.to_string(),
                });
            }
            _ => {}
        }
    }

    fn warn_missing(&self) {
        if self.gemini.api_key.is_empty() {
            tracing::warn!("GEMINI_API_KEY not set: assistant requests will be rejected");
        }
        if self.nutrition.app_id.is_none() || self.nutrition.app_key.is_none() {
            tracing::warn!("nutrition credentials not set: barcode lookups may be rejected");
        }
        if self.firebase.is_none() {
            tracing::warn!("firebase not configured: using in-process local backend");
        }
    }
}
