//! One logical HTTP call: timeout, classification, exponential backoff.
//!
//! ## Retry Strategy
//!
//! Backends behind serverless platforms cold-start, rate-limit and time out
//! under load. Statuses `408, 429, 500, 502, 503, 504`, per-attempt timeouts
//! and connect/abort/network errors are retried after
//! `min(base * multiplier^(n-1), max)`: with the defaults 1 s → 2 s → 4 s.
//! Everything else (other 4xx, non-transient transport errors) returns at
//! once. The last failure is always returned with its attempt count.

use crate::config::RetryPolicy;
use crate::error::{FailureKind, RequestError};
use crate::pipeline::transport::{HttpRequest, HttpResponse, Transport};
use crate::progress::ObserverHandle;
use crate::session::SessionProvider;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Executes requests against a [`Transport`] under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    session: Option<Arc<dyn SessionProvider>>,
    observer: Option<ObserverHandle>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            session: None,
            observer: None,
        }
    }

    /// Attach a bearer token source. Requests go out unauthenticated while
    /// the session holds no token.
    pub fn with_session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_observer(mut self, observer: Option<ObserverHandle>) -> Self {
        self.observer = observer;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request`, retrying transient failures.
    ///
    /// Returns `Ok` only for a 2xx response.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, RequestError> {
        let request = self.authorize(request);
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            let outcome = timeout(self.policy.timeout(), self.transport.send(&request)).await;
            let failure = match outcome {
                Ok(Ok(response)) if response.is_success() => {
                    debug!(
                        "{}: HTTP {} on attempt {}",
                        request.url, response.status, attempt
                    );
                    return Ok(response);
                }
                Ok(Ok(response)) => FailureKind::Status {
                    status: response.status,
                    message: response.summary(),
                },
                Ok(Err(e)) => FailureKind::Transport {
                    kind: e.kind,
                    message: e.message,
                },
                Err(_) => FailureKind::Timeout {
                    timeout_ms: self.policy.timeout_ms,
                },
            };

            if !failure.is_retryable() || attempt >= max_attempts {
                if failure.is_retryable() {
                    warn!(
                        "{}: giving up after {} attempt(s): {}",
                        request.url, attempt, failure
                    );
                } else {
                    debug!("{}: not retryable: {}", request.url, failure);
                }
                return Err(RequestError {
                    url: request.url.clone(),
                    attempts: attempt,
                    kind: failure,
                });
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                "{}: attempt {} failed: {}; retry {}/{} in {}ms",
                request.url,
                attempt,
                failure,
                attempt,
                self.policy.max_retries,
                delay.as_millis()
            );
            if let Some(ref obs) = self.observer {
                obs.on_retry(&request.url, attempt, delay.as_millis() as u64);
            }
            sleep(delay).await;
            attempt += 1;
        }
    }

    fn authorize(&self, request: &HttpRequest) -> HttpRequest {
        let token = self.session.as_ref().and_then(|s| s.token());
        match token {
            Some(token) if request.header_value("Authorization").is_none() => request
                .clone()
                .header("Authorization", format!("Bearer {token}")),
            _ => request.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use crate::pipeline::transport::mock::{json, refused, status, ScriptedTransport};
    use crate::session::Session;
    use std::sync::Mutex;
    use tokio::time::Instant;

    const URL: &str = "https://backend.example/api/generate";

    fn executor(transport: Arc<ScriptedTransport>) -> RequestExecutor {
        RequestExecutor::new(transport, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn success_needs_one_call() {
        let ok = json(200, serde_json::json!({"success": true}));
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![ok]));
        let resp = executor(t.clone()).execute(&HttpRequest::get(URL)).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(t.calls_to(URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let t = Arc::new(ScriptedTransport::new().script(
            URL,
            vec![status(503), refused(), json(200, serde_json::json!({}))],
        ));
        let resp = executor(t.clone()).execute(&HttpRequest::get(URL)).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(t.calls_to(URL), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_is_1s_2s_4s() {
        struct Delays(Mutex<Vec<u64>>);
        impl crate::progress::GenerationObserver for Delays {
            fn on_retry(&self, _url: &str, _retry: u32, delay_ms: u64) {
                self.0.lock().unwrap().push(delay_ms);
            }
        }

        let t = Arc::new(ScriptedTransport::new().script(URL, vec![status(503)]));
        let delays = Arc::new(Delays(Mutex::new(Vec::new())));
        let exec = executor(t.clone()).with_observer(Some(delays.clone()));

        let start = Instant::now();
        let err = exec.execute(&HttpRequest::get(URL)).await.unwrap_err();
        let elapsed = start.elapsed().as_millis();

        assert_eq!(*delays.0.lock().unwrap(), vec![1000, 2000, 4000]);
        assert!((7000..7010).contains(&elapsed), "elapsed {elapsed}ms");
        assert_eq!(err.attempts, 4);
        assert_eq!(t.calls_to(URL), 4);
        assert_eq!(err.kind.status(), Some(503));
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![status(404)]));
        let err = executor(t.clone()).execute(&HttpRequest::get(URL)).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.kind.status(), Some(404));
        assert_eq!(t.calls_to(URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried() {
        let t = Arc::new(ScriptedTransport::new().script(
            URL,
            vec![status(429), status(408), json(200, serde_json::json!({}))],
        ));
        assert!(executor(t.clone()).execute(&HttpRequest::get(URL)).await.is_ok());
        assert_eq!(t.calls_to(URL), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_transport_error_returns_immediately() {
        let t = Arc::new(ScriptedTransport::new());
        let err = executor(t.clone())
            .execute(&HttpRequest::get("https://unscripted.example"))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(
            err.kind,
            FailureKind::Transport { kind: TransportErrorKind::Other, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_retries() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![refused()]));
        let policy = RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        };
        let err = RequestExecutor::new(t.clone(), policy)
            .execute(&HttpRequest::get(URL))
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(t.calls_to(URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_transport_times_out_and_retries() {
        struct Hanging;
        impl Transport for Hanging {
            fn send<'a>(
                &'a self,
                _r: &'a HttpRequest,
            ) -> crate::pipeline::transport::TransportFuture<'a> {
                Box::pin(futures::future::pending())
            }
        }
        let policy = RetryPolicy {
            max_retries: 2,
            timeout_ms: 500,
            ..RetryPolicy::default()
        };
        let start = Instant::now();
        let err = RequestExecutor::new(Arc::new(Hanging), policy)
            .execute(&HttpRequest::get(URL))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout { timeout_ms: 500 });
        assert_eq!(err.attempts, 3);
        // three timeouts plus 1 s and 2 s of backoff
        let elapsed = start.elapsed().as_millis();
        assert!((4500..4510).contains(&elapsed), "elapsed {elapsed}ms");
    }

    #[tokio::test(start_paused = true)]
    async fn bearer_token_is_attached_when_present() {
        let ok = json(200, serde_json::json!({}));
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![ok]));
        let session = Arc::new(Session::new());
        let exec = executor(t.clone()).with_session(session.clone());

        exec.execute(&HttpRequest::get(URL)).await.unwrap();
        session.init("tok-123");
        exec.execute(&HttpRequest::get(URL)).await.unwrap();

        let calls = t.calls.lock().unwrap();
        assert_eq!(calls[0].header_value("Authorization"), None);
        assert_eq!(calls[1].header_value("Authorization"), Some("Bearer tok-123"));
    }
}
