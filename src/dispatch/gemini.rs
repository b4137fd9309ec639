use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::GeminiConfig;
use crate::dispatch::retry::RetryPolicy;
use crate::dispatch::{Completion, build_client, error_from_status, read_capped};
use crate::error::AtemateError;

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Per-attempt ceiling covering send and body read.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SERVICE: &str = "gemini";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Generative-AI query client. Stateless between calls: every `generate`
/// owns its attempt counter, so concurrent calls never interact.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    policy: RetryPolicy,
    request_timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .field("policy", &self.policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, policy: RetryPolicy) -> Result<Self, AtemateError> {
        Ok(Self {
            client: build_client()?,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            policy,
            request_timeout: config.request_timeout,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `prompt` and return the trimmed text of the first candidate.
    ///
    /// HTTP 503 is retried after the policy delay until the attempt budget is
    /// spent (`RetryExhausted`). A 2xx body without candidate text fails with
    /// `EmptyResponse`, any other status with `Transport`; neither is retried.
    pub async fn generate(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AtemateError> {
        let start = Instant::now();
        let attempts = self.policy.attempts();
        let mut attempt: u32 = 0;

        tracing::debug!(prompt_chars = prompt.len(), "gemini query");

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(AtemateError::Cancelled(elapsed_ms(start)));
            }

            let err = match self.attempt(prompt, cancel, start).await {
                Ok(text) => return Ok(text),
                Err(e @ AtemateError::Cancelled(_)) => {
                    tracing::debug!(attempt = attempt, "gemini query cancelled");
                    return Err(e);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::error!(attempt = attempt, status = ?err.status(), "gemini query failed: {err}");
                return Err(err);
            }

            if attempt >= attempts {
                tracing::warn!(attempts = attempts, "gemini overloaded, retry budget spent");
                return Err(AtemateError::RetryExhausted { attempts });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "gemini model overloaded, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AtemateError::Cancelled(elapsed_ms(start)));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
        start: Instant,
    ) -> Result<String, AtemateError> {
        let exchange = async {
            let response = self
                .client
                .post(&self.endpoint)
                .query(&[("key", &self.api_key)])
                .header(CONTENT_TYPE, "application/json")
                .json(&GenerateRequest::new(prompt))
                .send()
                .await?;

            let status = response.status();
            if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(AtemateError::Overloaded {
                    service: SERVICE.to_string(),
                });
            }
            if !status.is_success() {
                return Err(error_from_status(response, SERVICE).await);
            }

            read_capped(response, SERVICE).await
        };

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AtemateError::Cancelled(elapsed_ms(start)));
            }
            result = tokio::time::timeout(self.request_timeout, exchange) => match result {
                Ok(bytes) => bytes?,
                Err(_) => return Err(AtemateError::Timeout(self.request_timeout.as_millis() as u64)),
            },
        };

        extract_text(&bytes)
    }
}

#[async_trait]
impl Completion for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AtemateError> {
        self.generate(prompt, cancel).await
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a success body.
fn extract_text(body: &[u8]) -> Result<String, AtemateError> {
    let parsed: GenerateResponse = serde_json::from_slice(body)
        .map_err(|e| AtemateError::EmptyResponse(format!("undecodable body: {e}")))?;

    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .filter(|t| !t.is_empty())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| AtemateError::EmptyResponse("no candidate text".to_string()))
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_wire_shape() {
        let body = serde_json::to_value(GenerateRequest::new("hi")).unwrap();
        assert_eq!(body, serde_json::json!({"contents": [{"parts": [{"text": "hi"}]}]}));
    }

    #[test]
    fn extracts_and_trims_first_candidate() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"  eat greens \n"},{"text":"x"}]}},
            {"content":{"parts":[{"text":"second"}]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "eat greens");
    }

    #[test]
    fn whitespace_only_text_trims_to_empty() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"   \n "}]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "");
    }

    #[test]
    fn missing_structure_is_empty_response() {
        for body in [
            &br#"{}"#[..],
            br#"{"candidates":[]}"#,
            br#"{"candidates":[{}]}"#,
            br#"{"candidates":[{"content":{"parts":[]}}]}"#,
            br#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#,
            b"not json",
        ] {
            assert!(matches!(extract_text(body), Err(AtemateError::EmptyResponse(_))));
        }
    }
}
