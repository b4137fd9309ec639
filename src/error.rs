use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtemateError {
    /// A single attempt hit HTTP 503. The AI client retries on this; callers
    /// of the client only ever see `RetryExhausted`.
    #[error("service overloaded (HTTP 503) at {service}")]
    Overloaded { service: String },

    #[error("gave up after {attempts} attempts: service overloaded")]
    RetryExhausted { attempts: u32 },

    #[error("empty response: {0}")]
    EmptyResponse(String),

    #[error("transport error from {service}: {message}")]
    Transport {
        service: String,
        message: String,
        status: Option<u16>,
    },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("cancelled after {0}ms")]
    Cancelled(u64),

    #[error("auth failed: {0}")]
    AuthFailed(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("config error: {0}")]
    Config(String),
}

impl AtemateError {
    /// Only transient overload is worth another attempt. Timeouts and
    /// connection failures are surfaced to the caller, who may re-issue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }

    /// Network failures and non-retryable HTTP statuses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Request(_))
    }

    /// HTTP status carried by the error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Overloaded { .. } => Some(503),
            Self::Transport { status, .. } => *status,
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Sanitized message safe to show an end user or a tool client.
    /// Does not leak upstream bodies, URLs or credentials.
    pub fn user_message(&self) -> String {
        match self {
            Self::Overloaded { .. } | Self::RetryExhausted { .. } => {
                "the assistant is busy right now, try again shortly".to_string()
            }
            Self::EmptyResponse(_) => "the service returned no answer".to_string(),
            Self::Transport { service, .. } => format!("request to {service} failed"),
            Self::Request(_) => "network request failed".to_string(),
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::Cancelled(_) => "request cancelled".to_string(),
            Self::AuthFailed(msg) => format!("authentication failed: {msg}"),
            Self::NotSignedIn => "sign in first".to_string(),
            Self::NotFound(what) => format!("not found: {what}"),
            Self::InvalidInput(msg) => msg.clone(),
            Self::SchemaParse(_) => "failed to parse service response".to_string(),
            Self::Config(msg) => format!("configuration error: {msg}"),
        }
    }
}
