//! Scripted HTTP peer for driving the REST clients against a local socket.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One request as it arrived on the wire.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    /// Path plus query string, still percent-encoded.
    pub target: String,
    pub head: String,
    pub body: String,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with(&prefix))
            .map(|line| line[prefix.len()..].trim().to_string())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct MockServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Captured>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind to an ephemeral port on loopback.
pub async fn mock_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Answer requests in order from `replies`; the last reply repeats.
pub async fn scripted(replies: Vec<Reply>) -> MockServer {
    assert!(!replies.is_empty());
    routed(move |index, _| replies[index.min(replies.len() - 1)].clone()).await
}

/// Answer each request with `route(index, &request)`. Every response closes
/// its connection, so one accepted connection is one request.
pub async fn routed<F>(route: F) -> MockServer
where
    F: Fn(usize, &Captured) -> Reply + Send + Sync + 'static,
{
    let (listener, port) = mock_listener().await;
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));

    let task = {
        let hits = hits.clone();
        let requests = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(captured) = read_request(&mut socket).await else {
                    continue;
                };
                let index = hits.fetch_add(1, Ordering::SeqCst);
                requests.lock().unwrap().push(captured.clone());
                let reply = route(index, &captured);
                tokio::spawn(async move {
                    if !reply.delay.is_zero() {
                        tokio::time::sleep(reply.delay).await;
                    }
                    let response = format!(
                        "HTTP/1.1 {} {}\r\n\
                         Content-Type: application/json\r\n\
                         Content-Length: {}\r\n\
                         Connection: close\r\n\r\n{}",
                        reply.status,
                        reason(reply.status),
                        reply.body.len(),
                        reply.body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        })
    };

    MockServer {
        base_url: format!("http://127.0.0.1:{port}"),
        hits,
        requests,
        task,
    }
}

/// Port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let (listener, port) = mock_listener().await;
    drop(listener);
    port
}

async fn read_request(socket: &mut TcpStream) -> Option<Captured> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_string();
        let length = head
            .lines()
            .find_map(|line| {
                let lower = line.to_ascii_lowercase();
                lower
                    .strip_prefix("content-length:")
                    .and_then(|v| v.trim().parse::<usize>().ok())
            })
            .unwrap_or(0);
        if buf.len() < end + 4 + length {
            continue;
        }

        let body = String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        return Some(Captured {
            method: request_line.next().unwrap_or_default().to_string(),
            target: request_line.next().unwrap_or_default().to_string(),
            head,
            body,
        });
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A Gemini success body carrying `text`.
pub fn gemini_text(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
    })
}
