//! Fail-over across an ordered list of equivalent endpoints.
//!
//! Each candidate is tried through the [`RequestExecutor`], so every URL
//! gets the full retry budget before the router moves on. The router moves
//! on only for server-class failures (5xx, timeouts, transport errors):
//! a 4xx will not improve on another server and is returned unchanged.

use crate::error::{RequestError, RouteError};
use crate::pipeline::executor::RequestExecutor;
use crate::pipeline::transport::{HttpRequest, HttpResponse};
use tracing::{info, warn};

/// Successful routed call.
#[derive(Debug, Clone)]
pub struct Routed {
    pub response: HttpResponse,
    /// URL that produced the response.
    pub url: String,
    /// Failures on earlier candidates, in order.
    pub failed_over: Vec<RequestError>,
}

#[derive(Clone)]
pub struct FallbackRouter {
    executor: RequestExecutor,
}

impl FallbackRouter {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Try `request` at its own URL, then at `fallback_url` on a
    /// server-class failure.
    pub async fn execute_with_fallback(
        &self,
        request: &HttpRequest,
        fallback_url: Option<&str>,
    ) -> Result<Routed, RouteError> {
        let mut urls = vec![request.url.clone()];
        urls.extend(fallback_url.map(str::to_string));
        self.execute_chain(request, &urls).await
    }

    /// Try `request` against each URL in order; first success wins.
    ///
    /// The URL inside `request` is ignored in favour of `urls`.
    pub async fn execute_chain(
        &self,
        request: &HttpRequest,
        urls: &[String],
    ) -> Result<Routed, RouteError> {
        let mut failures: Vec<RequestError> = Vec::new();

        for (i, url) in urls.iter().enumerate() {
            let attempt = request.with_url(url.as_str());
            match self.executor.execute(&attempt).await {
                Ok(response) => {
                    if i > 0 {
                        info!("Fallback endpoint {} succeeded after {} failure(s)", url, i);
                    }
                    return Ok(Routed {
                        response,
                        url: url.clone(),
                        failed_over: failures,
                    });
                }
                Err(e) => {
                    let has_next = i + 1 < urls.len();
                    if !e.is_server_class() || !has_next {
                        if !e.is_server_class() && has_next {
                            warn!("{}: client-class failure, not falling back: {}", url, e);
                        }
                        failures.push(e);
                        return Err(aggregate(failures));
                    }
                    warn!("{}: server-class failure, trying {}: {}", url, urls[i + 1], e);
                    failures.push(e);
                }
            }
        }

        Err(RouteError::Exhausted(failures))
    }
}

fn aggregate(mut failures: Vec<RequestError>) -> RouteError {
    if failures.len() == 1 {
        RouteError::Request(failures.remove(0))
    } else {
        RouteError::Exhausted(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::pipeline::transport::mock::{json, refused, status, Outcome, ScriptedTransport};
    use std::sync::Arc;

    const PRIMARY: &str = "https://primary.example/api/document-generator";
    const FALLBACK: &str = "https://fallback.example/api/document-generator";

    fn router(t: Arc<ScriptedTransport>) -> FallbackRouter {
        FallbackRouter::new(RequestExecutor::new(t, RetryPolicy::default()))
    }

    /// One scripted outcome for each end of the primary/fallback pair.
    fn pair(primary: Outcome, fallback: Outcome) -> Arc<ScriptedTransport> {
        Arc::new(
            ScriptedTransport::new()
                .script(PRIMARY, vec![primary])
                .script(FALLBACK, vec![fallback]),
        )
    }

    fn ok() -> Outcome {
        json(200, serde_json::json!({"success": true}))
    }

    #[tokio::test(start_paused = true)]
    async fn primary_success_skips_fallback() {
        let t = pair(ok(), ok());
        let routed = router(t.clone())
            .execute_with_fallback(&HttpRequest::get(PRIMARY), Some(FALLBACK))
            .await
            .unwrap();
        assert_eq!(routed.url, PRIMARY);
        assert_eq!(t.calls_to(FALLBACK), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_never_falls_back() {
        let t = pair(status(404), ok());
        let err = router(t.clone())
            .execute_with_fallback(&HttpRequest::get(PRIMARY), Some(FALLBACK))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Request(ref e) if e.kind.status() == Some(404)));
        assert_eq!(t.calls_to(PRIMARY), 1);
        assert_eq!(t.calls_to(FALLBACK), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn service_unavailable_falls_back_exactly_once() {
        let t = pair(status(503), ok());
        let routed = router(t.clone())
            .execute_with_fallback(&HttpRequest::get(PRIMARY), Some(FALLBACK))
            .await
            .unwrap();
        assert_eq!(routed.url, FALLBACK);
        assert_eq!(routed.failed_over.len(), 1);
        assert_eq!(t.calls_to(PRIMARY), 4);
        assert_eq!(t.calls_to(FALLBACK), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn both_failing_keeps_both_messages() {
        let t = pair(status(502), refused());
        let err = router(t.clone())
            .execute_with_fallback(&HttpRequest::get(PRIMARY), Some(FALLBACK))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(PRIMARY) && msg.contains("502"), "got: {msg}");
        assert!(msg.contains(FALLBACK) && msg.contains("connection refused"), "got: {msg}");
        assert_eq!(err.failures().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_fallback_returns_executor_error_unchanged() {
        let t = Arc::new(ScriptedTransport::new().script(PRIMARY, vec![status(500)]));
        let err = router(t.clone())
            .execute_with_fallback(&HttpRequest::get(PRIMARY), None)
            .await
            .unwrap_err();
        match err {
            RouteError::Request(e) => {
                assert_eq!(e.url, PRIMARY);
                assert_eq!(e.attempts, 4);
            }
            other => panic!("expected single failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chain_stops_at_first_success() {
        let third = "https://third.example/gen".to_string();
        let t = Arc::new(
            ScriptedTransport::new()
                .script(PRIMARY, vec![refused()])
                .script(FALLBACK, vec![ok()])
                .script(&third, vec![ok()]),
        );
        let urls = vec![PRIMARY.to_string(), FALLBACK.to_string(), third.clone()];
        let routed = router(t.clone())
            .execute_chain(&HttpRequest::get("ignored"), &urls)
            .await
            .unwrap();
        assert_eq!(routed.url, FALLBACK);
        assert_eq!(t.calls_to(&third), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_on_fallback_is_aggregated() {
        let t = pair(status(503), status(400));
        let err = router(t.clone())
            .execute_with_fallback(&HttpRequest::get(PRIMARY), Some(FALLBACK))
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Exhausted(ref all) if all.len() == 2));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let t = Arc::new(ScriptedTransport::new());
        let err = router(t).execute_chain(&HttpRequest::get("x"), &[]).await.unwrap_err();
        assert!(matches!(err, RouteError::Exhausted(ref all) if all.is_empty()));
    }
}
