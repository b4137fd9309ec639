pub mod gemini;
pub mod nutrition;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tokio_util::sync::CancellationToken;

use crate::error::AtemateError;

/// Cap on any response body read into memory.
pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Text completion seam. The Gemini client is the production implementation;
/// wellness services only see this trait.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Produce one completion for `prompt`. Implementations stop early and
    /// return `Cancelled` once `cancel` fires.
    async fn complete(&self, prompt: &str, cancel: &CancellationToken)
    -> Result<String, AtemateError>;
}

/// Shared reqwest client settings for every outbound service.
pub fn build_client() -> Result<Client, AtemateError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(4)
        .user_agent(concat!("atemate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AtemateError::Config(format!("failed to build HTTP client: {e}")))
}

/// Read a response body, refusing anything over `MAX_RESPONSE_BYTES`.
pub async fn read_capped(response: Response, service: &str) -> Result<Vec<u8>, AtemateError> {
    if let Some(len) = response.content_length()
        && len as usize > MAX_RESPONSE_BYTES
    {
        return Err(too_large(service, len as usize));
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(too_large(service, bytes.len()));
    }
    Ok(bytes.to_vec())
}

/// Turn a non-success response into a `Transport` error with a truncated body.
pub async fn error_from_status(response: Response, service: &str) -> AtemateError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    let truncated = &body[..body.len().min(2048)];
    AtemateError::Transport {
        service: service.to_string(),
        message: format!("{status}: {}", String::from_utf8_lossy(truncated)),
        status: Some(status.as_u16()),
    }
}

fn too_large(service: &str, len: usize) -> AtemateError {
    AtemateError::Transport {
        service: service.to_string(),
        message: format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
        status: None,
    }
}
