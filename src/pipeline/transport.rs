//! The network seam: one request in, one response (or transport error) out.
//!
//! Everything above this module (retry, fallback, recording) is written
//! against [`Transport`], so it can be driven by [`ReqwestTransport`] in
//! production and by scripted doubles in tests. A transport never retries
//! and never interprets status codes; a non-2xx answer is still `Ok`.

use crate::error::TransportErrorKind;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request as seen by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Same request, different target. Used when walking fallback candidates.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response as seen by the transport. Any status is possible.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// A short human-readable excerpt of the body for error messages.
    ///
    /// Prefers the backend's `message`/`error` fields when the body is JSON.
    pub fn summary(&self) -> String {
        if let Ok(v) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            for key in ["message", "error", "detail"] {
                if let Some(s) = v.get(key).and_then(|m| m.as_str()) {
                    return s.to_string();
                }
            }
        }
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        if text.is_empty() {
            "<empty body>".to_string()
        } else if text.chars().count() > 200 {
            format!("{}…", text.chars().take(200).collect::<String>())
        } else {
            text.to_string()
        }
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Failure before any status line was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TransportError {}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = BoxFuture<'a, Result<HttpResponse, TransportError>>;

/// Sends exactly one request.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a>;
}

/// Production transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// `connect_timeout` bounds connection setup only; whole-request
    /// timeouts are enforced by the executor.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("paperpress/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send_inner(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;
        debug!(
            "{} {} → {} ({} bytes)",
            method_name(request.method),
            request.url,
            status,
            body.len()
        );
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
        Box::pin(self.send_inner(request))
    }
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
    }
}

/// Map a reqwest error onto a transient/non-transient signature.
fn classify(e: reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_builder() {
        TransportErrorKind::Other
    } else if e.is_body() || e.is_decode() {
        TransportErrorKind::Aborted
    } else {
        TransportErrorKind::Network
    };
    TransportError::new(kind, e.to_string())
}

/// Scripted transport for unit tests.
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    pub(crate) type Outcome = Result<HttpResponse, TransportError>;

    /// Answers per URL from a queue; the last queued outcome repeats.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
        pub(crate) calls: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn script(self, url: &str, outcomes: Vec<Outcome>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), outcomes.into());
            self
        }

        pub(crate) fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|r| r.url == url).count()
        }

        pub(crate) fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    pub(crate) fn status(code: u16) -> Outcome {
        Ok(HttpResponse::new(code, format!("{{\"message\":\"status {code}\"}}")))
    }

    pub(crate) fn json(code: u16, body: serde_json::Value) -> Outcome {
        Ok(HttpResponse::new(code, body.to_string()))
    }

    pub(crate) fn refused() -> Outcome {
        Err(TransportError::new(TransportErrorKind::Connect, "connection refused"))
    }

    impl Transport for ScriptedTransport {
        fn send<'a>(&'a self, request: &'a HttpRequest) -> TransportFuture<'a> {
            self.calls.lock().unwrap().push(request.clone());
            let outcome = {
                let mut scripts = self.scripts.lock().unwrap();
                match scripts.get_mut(&request.url) {
                    Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                    Some(queue) => queue.front().cloned().unwrap_or_else(|| status(500)),
                    None => Err(TransportError::new(
                        TransportErrorKind::Other,
                        format!("unscripted URL {}", request.url),
                    )),
                }
            };
            Box::pin(async move { outcome })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prefers_backend_message() {
        let r = HttpResponse::new(400, r#"{"error":"Invalid JSON","message":"bad body"}"#);
        assert_eq!(r.summary(), "bad body");
        let r = HttpResponse::new(500, "");
        assert_eq!(r.summary(), "<empty body>");
        let long = "x".repeat(500);
        let r = HttpResponse::new(502, long);
        assert!(r.summary().chars().count() <= 201);
    }

    #[test]
    fn request_builders() {
        let r = HttpRequest::post_json("https://a/gen", serde_json::json!({"k": 1}))
            .header("X-Preview", "true");
        assert_eq!(r.method, Method::Post);
        assert_eq!(r.header_value("x-preview"), Some("true"));
        assert_eq!(r.header_value("content-type"), Some("application/json"));
        let moved = r.with_url("https://b/gen");
        assert_eq!(moved.url, "https://b/gen");
        assert_eq!(moved.body, r.body);
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(301, "").is_success());
        assert!(!HttpResponse::new(503, "").is_success());
    }

    #[test]
    fn reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }
}
