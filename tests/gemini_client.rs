mod common;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use atemate::config::GeminiConfig;
use atemate::dispatch::Completion;
use atemate::dispatch::gemini::GeminiClient;
use atemate::dispatch::retry::{Backoff, RetryPolicy};
use atemate::error::AtemateError;
use common::{Reply, closed_port, gemini_text, scripted};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn client(base_url: &str, policy: RetryPolicy) -> GeminiClient {
    client_with_timeout(base_url, policy, Duration::from_secs(5))
}

fn client_with_timeout(base_url: &str, policy: RetryPolicy, timeout: Duration) -> GeminiClient {
    let config = GeminiConfig {
        endpoint: format!("{base_url}/v1beta/models/test:generateContent"),
        api_key: "test-key".to_string(),
        request_timeout: timeout,
    };
    GeminiClient::new(&config, policy).unwrap()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_millis(20))
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_is_one_request_with_trimmed_text() {
    let server = scripted(vec![Reply::json(200, gemini_text("  Drink water.\n"))]).await;
    let gemini = client(&server.base_url, fast_policy());

    let text = gemini
        .generate("how much water?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(text, "Drink water.");
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn request_carries_key_and_prompt_body() {
    let server = scripted(vec![Reply::json(200, gemini_text("ok"))]).await;
    let gemini = client(&server.base_url, fast_policy());

    gemini.generate("hello", &CancellationToken::new()).await.unwrap();

    let requests = server.requests();
    let req = &requests[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.target, "/v1beta/models/test:generateContent?key=test-key");
    assert_eq!(
        req.header("content-type").as_deref(),
        Some("application/json")
    );
    assert_eq!(req.json(), json!({"contents": [{"parts": [{"text": "hello"}]}]}));
}

#[tokio::test]
async fn repeated_calls_are_independent() {
    let server = scripted(vec![Reply::json(200, gemini_text("same"))]).await;
    let gemini = client(&server.base_url, fast_policy());
    let cancel = CancellationToken::new();

    let first = gemini.generate("q", &cancel).await.unwrap();
    let second = gemini.generate("q", &cancel).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn works_through_completion_trait() {
    let server = scripted(vec![Reply::json(200, gemini_text("via trait"))]).await;
    let gemini: Box<dyn Completion> = Box::new(client(&server.base_url, fast_policy()));

    let text = gemini.complete("q", &CancellationToken::new()).await.unwrap();
    assert_eq!(text, "via trait");
}

// ---------------------------------------------------------------------------
// Retry on 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persistent_overload_exhausts_budget() {
    let server = scripted(vec![Reply::raw(503, "overloaded")]).await;
    let gemini = client(&server.base_url, fast_policy());
    assert_eq!(gemini.policy().attempts(), 3);

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, AtemateError::RetryExhausted { attempts: 3 }),
        "got {err:?}"
    );
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn overload_then_success_is_two_requests() {
    let server = scripted(vec![
        Reply::raw(503, "overloaded"),
        Reply::json(200, gemini_text("recovered")),
    ])
    .await;
    let gemini = client(&server.base_url, fast_policy());

    let text = gemini.generate("q", &CancellationToken::new()).await.unwrap();

    assert_eq!(text, "recovered");
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn retries_wait_the_configured_delay() {
    let server = scripted(vec![Reply::raw(503, "")]).await;
    let policy = RetryPolicy::fixed(3, Duration::from_millis(150));
    let gemini = client(&server.base_url, policy);

    let start = Instant::now();
    let _ = gemini.generate("q", &CancellationToken::new()).await;

    // Two waits between three attempts, none after the last.
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn exponential_backoff_still_bounded_by_budget() {
    let server = scripted(vec![Reply::raw(503, "")]).await;
    let policy = RetryPolicy {
        max_retries: 4,
        retry_delay: Duration::from_millis(10),
        backoff: Backoff::Exponential {
            max_delay: Duration::from_millis(40),
        },
    };
    let gemini = client(&server.base_url, policy);

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AtemateError::RetryExhausted { attempts: 4 }));
    assert_eq!(server.hits(), 4);
}

#[tokio::test]
async fn zero_budget_still_sends_once() {
    let server = scripted(vec![Reply::raw(503, "")]).await;
    let gemini = client(&server.base_url, RetryPolicy::fixed(0, Duration::from_millis(10)));

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AtemateError::RetryExhausted { attempts: 1 }));
    assert_eq!(server.hits(), 1);
}

// ---------------------------------------------------------------------------
// Non-retryable failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_without_candidates_is_empty_response() {
    let server = scripted(vec![Reply::json(200, json!({"promptFeedback": {}}))]).await;
    let gemini = client(&server.base_url, fast_policy());

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AtemateError::EmptyResponse(_)), "got {err:?}");
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn whitespace_candidate_text_trims_to_empty_string() {
    let server = scripted(vec![Reply::json(200, gemini_text("   \n "))]).await;
    let gemini = client(&server.base_url, fast_policy());

    let text = gemini.generate("q", &CancellationToken::new()).await.unwrap();

    assert_eq!(text, "");
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn empty_candidate_text_is_empty_response() {
    let server = scripted(vec![Reply::json(200, gemini_text(""))]).await;
    let gemini = client(&server.base_url, fast_policy());

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AtemateError::EmptyResponse(_)), "got {err:?}");
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn client_error_is_transport_without_retry() {
    let server = scripted(vec![Reply::json(
        400,
        json!({"error": {"message": "API key not valid"}}),
    )])
    .await;
    let gemini = client(&server.base_url, fast_policy());

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_transport(), "got {err:?}");
    assert!(!err.is_retryable());
    assert_eq!(err.status(), Some(400));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn server_error_other_than_503_is_not_retried() {
    let server = scripted(vec![Reply::raw(500, "boom")]).await;
    let gemini = client(&server.base_url, fast_policy());

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn unreachable_host_is_transport() {
    let port = closed_port().await;
    let gemini = client(&format!("http://127.0.0.1:{port}"), fast_policy());

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_transport(), "got {err:?}");
}

#[tokio::test]
async fn transport_message_hides_upstream_body() {
    let server = scripted(vec![Reply::raw(403, "secret-internal-detail")]).await;
    let gemini = client(&server.base_url, fast_policy());

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(!err.user_message().contains("secret-internal-detail"));
    assert!(!err.user_message().contains("test-key"));
}

// ---------------------------------------------------------------------------
// Cancellation and timeout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_sends_nothing() {
    let server = scripted(vec![Reply::json(200, gemini_text("never"))]).await;
    let gemini = client(&server.base_url, fast_policy());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = gemini.generate("q", &cancel).await.unwrap_err();

    assert!(matches!(err, AtemateError::Cancelled(_)));
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn cancel_during_retry_delay_stops_further_requests() {
    let server = scripted(vec![Reply::raw(503, "")]).await;
    let gemini = client(&server.base_url, RetryPolicy::fixed(3, Duration::from_secs(10)));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = gemini.generate("q", &cancel).await.unwrap_err();

    assert!(matches!(err, AtemateError::Cancelled(_)), "got {err:?}");
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn cancel_during_request_returns_promptly() {
    let server = scripted(vec![
        Reply::json(200, gemini_text("late")).delayed(Duration::from_secs(10)),
    ])
    .await;
    let gemini = client(&server.base_url, fast_policy());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = gemini.generate("q", &cancel).await.unwrap_err();

    assert!(matches!(err, AtemateError::Cancelled(_)));
    assert!(start.elapsed() < Duration::from_secs(5));
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn cancellation_is_not_logged_as_error() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = scripted(vec![
        Reply::json(200, gemini_text("late")).delayed(Duration::from_secs(10)),
    ])
    .await;
    let gemini = client(&server.base_url, fast_policy());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = gemini.generate("q", &cancel).await.unwrap_err();

    assert!(matches!(err, AtemateError::Cancelled(_)));
    let output = logs.contents();
    assert!(output.contains("gemini query cancelled"), "logs: {output}");
    assert!(!output.contains("ERROR"), "logs: {output}");
}

#[tokio::test]
async fn slow_attempt_times_out_without_retry() {
    let server = scripted(vec![
        Reply::json(200, gemini_text("late")).delayed(Duration::from_secs(5)),
    ])
    .await;
    let gemini = client_with_timeout(
        &server.base_url,
        fast_policy(),
        Duration::from_millis(200),
    );

    let err = gemini
        .generate("q", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AtemateError::Timeout(200)), "got {err:?}");
    assert_eq!(server.hits(), 1);
}
