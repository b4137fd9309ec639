use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::backend::{IdentityService, UserHandle};
use crate::config::FirebaseConfig;
use crate::dispatch::{build_client, read_capped};
use crate::error::AtemateError;

const SERVICE: &str = "firebase-auth";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Email/password accounts through the Identity Toolkit REST API.
pub struct FirebaseAuth {
    client: Client,
    endpoint: String,
    api_key: String,
    session: RwLock<Option<UserHandle>>,
}

impl FirebaseAuth {
    pub fn new(config: &FirebaseConfig) -> Result<Self, AtemateError> {
        Ok(Self {
            client: build_client()?,
            endpoint: config.auth_endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            session: RwLock::new(None),
        })
    }

    async fn exchange(
        &self,
        action: &str,
        email: &str,
        password: &str,
    ) -> Result<UserHandle, AtemateError> {
        let url = format!("{}/accounts:{action}", self.endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        let status = response.status();
        let bytes = read_capped(response, SERVICE).await?;

        if !status.is_success() {
            // Identity Toolkit reports failures as 400 with a code in error.message.
            let code = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|e| e.error.message)
                .unwrap_or_default();
            if status.is_client_error() && !code.is_empty() {
                return Err(AtemateError::AuthFailed(describe_code(&code)));
            }
            return Err(AtemateError::Transport {
                service: SERVICE.to_string(),
                message: format!("{status}"),
                status: Some(status.as_u16()),
            });
        }

        let parsed: AuthResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AtemateError::SchemaParse(format!("auth response: {e}")))?;

        let user = UserHandle {
            uid: parsed.local_id,
            email: if parsed.email.is_empty() {
                email.to_string()
            } else {
                parsed.email
            },
            id_token: parsed.id_token,
        };
        self.replace_session(Some(user.clone()));
        tracing::info!(uid = %user.uid, action = action, "signed in");
        Ok(user)
    }

    fn replace_session(&self, user: Option<UserHandle>) {
        match self.session.write() {
            Ok(mut guard) => *guard = user,
            Err(poisoned) => *poisoned.into_inner() = user,
        }
    }
}

#[async_trait]
impl IdentityService for FirebaseAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, AtemateError> {
        self.exchange("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, AtemateError> {
        self.exchange("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), AtemateError> {
        self.replace_session(None);
        Ok(())
    }

    fn current_user(&self) -> Option<UserHandle> {
        match self.session.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Readable text for Identity Toolkit error codes. Codes may carry a suffix
/// (`WEAK_PASSWORD : Password should be at least 6 characters`).
pub fn describe_code(code: &str) -> String {
    let head = code.split(':').next().unwrap_or(code).trim();
    match head {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "invalid email or password".to_string()
        }
        "EMAIL_EXISTS" => "an account with this email already exists".to_string(),
        "INVALID_EMAIL" => "email address is malformed".to_string(),
        "WEAK_PASSWORD" => "password should be at least 6 characters".to_string(),
        "USER_DISABLED" => "this account has been disabled".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "too many attempts, try again later".to_string(),
        other => other.to_lowercase().replace('_', " "),
    }
}
