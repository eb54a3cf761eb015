//! Best-effort download history.
//!
//! Recording runs after the artifact has been handed to the caller and its
//! outcome never reaches them: [`DownloadRecorder::record`] returns a plain
//! `bool` and every failure is logged here and nowhere else.
//!
//! The recorder talks to the [`Transport`] directly with its own small loop
//! (`max_attempts`, delay `delay_ms * n` before retry `n`) rather than going
//! through the request executor; a slow history service must not inherit
//! the generation retry budget.

use crate::config::RecorderPolicy;
use crate::document::DocumentMetadata;
use crate::error::{ErrorKind, TransportErrorKind};
use crate::pipeline::payload::RecordResponse;
use crate::pipeline::transport::{HttpRequest, Transport};
use crate::session::SessionProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Body posted to the download history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub document_title: String,
    pub file_format: String,
    pub file_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    pub document_metadata: DocumentMetadata,
}

/// Why a recording attempt failed. Logged, never returned to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordingError {
    #[error("no active session")]
    NoSession,

    #[error("session rejected (401); session invalidated")]
    Unauthorized,

    #[error("history service answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("history service answered success=false: {0}")]
    NotRecorded(String),

    #[error("transport error ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("timed out after {0}ms")]
    Timeout(u64),
}

impl RecordingError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RecordingFailed
    }

    fn is_retryable(&self) -> bool {
        match self {
            RecordingError::NoSession | RecordingError::Unauthorized => false,
            RecordingError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            RecordingError::NotRecorded(_) => false,
            RecordingError::Transport { kind, .. } => kind.is_transient(),
            RecordingError::Timeout(_) => true,
        }
    }
}

/// Posts [`DownloadRecord`]s with bearer authentication.
#[derive(Clone)]
pub struct DownloadRecorder {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionProvider>,
    url: Option<String>,
    policy: RecorderPolicy,
}

impl DownloadRecorder {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionProvider>,
        url: Option<String>,
        policy: RecorderPolicy,
    ) -> Self {
        Self {
            transport,
            session,
            url,
            policy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Record one download. `true` only when the service confirmed it.
    pub async fn record(&self, record: DownloadRecord) -> bool {
        let Some(url) = self.url.as_deref() else {
            debug!("Download recording disabled (no endpoint)");
            return false;
        };

        let body = match serde_json::to_value(&record) {
            Ok(body) => body,
            Err(e) => {
                warn!("Download record for '{}' not serialisable: {}", record.document_title, e);
                return false;
            }
        };

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.attempt(url, &body).await {
                Ok(id) => {
                    info!(
                        "Recorded {} download of '{}' (id {})",
                        record.file_format,
                        record.document_title,
                        id.as_deref().unwrap_or("?")
                    );
                    return true;
                }
                Err(RecordingError::NoSession) => {
                    debug!("Download not recorded: {}", RecordingError::NoSession);
                    return false;
                }
                Err(e) if !e.is_retryable() || attempt == max_attempts => {
                    warn!(
                        kind = ?e.kind(),
                        "Download recording gave up after {} attempt(s): {}",
                        attempt,
                        e
                    );
                    return false;
                }
                Err(e) => {
                    let delay = Duration::from_millis(self.policy.delay_ms * u64::from(attempt));
                    debug!(
                        "Download recording attempt {} failed: {}; retrying in {}ms",
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
            }
        }
        false
    }

    /// Run [`DownloadRecorder::record`] on its own task.
    pub fn spawn(&self, record: DownloadRecord) -> RecordingHandle {
        let recorder = self.clone();
        RecordingHandle {
            inner: tokio::spawn(async move { recorder.record(record).await }),
        }
    }

    async fn attempt(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<Option<String>, RecordingError> {
        // Re-read every attempt: a 401 on an earlier attempt or another
        // task may have invalidated it.
        let token = self.session.token().ok_or(RecordingError::NoSession)?;
        let request = HttpRequest::post_json(url, body.clone())
            .header("Authorization", format!("Bearer {token}"));

        let response = match timeout(
            Duration::from_millis(self.policy.timeout_ms),
            self.transport.send(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(RecordingError::Transport {
                    kind: e.kind,
                    message: e.message,
                })
            }
            Err(_) => return Err(RecordingError::Timeout(self.policy.timeout_ms)),
        };

        if response.status == 401 {
            self.session.invalidate();
            return Err(RecordingError::Unauthorized);
        }
        if !response.is_success() {
            return Err(RecordingError::Rejected {
                status: response.status,
                message: response.summary(),
            });
        }

        let parsed: RecordResponse = response.json().unwrap_or_default();
        if parsed.success == Some(false) {
            return Err(RecordingError::NotRecorded(
                parsed.message.unwrap_or_else(|| "no reason given".into()),
            ));
        }
        Ok(parsed.data.and_then(|d| d.id).map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }))
    }
}

/// Handle to a detached recording task.
///
/// Dropping it does not cancel the task.
#[derive(Debug)]
pub struct RecordingHandle {
    inner: JoinHandle<bool>,
}

impl RecordingHandle {
    /// Wait for the recording outcome. A panicked task counts as `false`.
    pub async fn wait(self) -> bool {
        self.inner.await.unwrap_or(false)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::transport::mock::{json, refused, status, ScriptedTransport};
    use crate::session::Session;
    use tokio::time::Instant;

    const URL: &str = "https://history.example/api/download/record";

    fn record() -> DownloadRecord {
        DownloadRecord {
            document_title: "Paper".into(),
            file_format: "pdf".into(),
            file_size: 42,
            file_data: None,
            document_metadata: DocumentMetadata::default(),
        }
    }

    fn recorder(t: Arc<ScriptedTransport>, session: Arc<Session>) -> DownloadRecorder {
        DownloadRecorder::new(t, session, Some(URL.into()), RecorderPolicy::default())
    }

    fn ok() -> crate::pipeline::transport::mock::Outcome {
        json(200, serde_json::json!({"success": true, "data": {"id": 7}}))
    }

    #[test]
    fn record_body_is_camel_case() {
        let v = serde_json::to_value(record()).unwrap();
        assert_eq!(v["documentTitle"], "Paper");
        assert_eq!(v["fileFormat"], "pdf");
        assert_eq!(v["fileSize"], 42);
        assert!(v.get("fileData").is_none());
        assert!(v["documentMetadata"].is_object());
    }

    #[tokio::test(start_paused = true)]
    async fn no_token_means_no_request() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![ok()]));
        let ok = recorder(t.clone(), Arc::new(Session::new())).record(record()).await;
        assert!(!ok);
        assert_eq!(t.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_sends_bearer_token() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![ok()]));
        let session = Arc::new(Session::with_token("tok"));
        assert!(recorder(t.clone(), session).record(record()).await);
        let calls = t.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].header_value("Authorization"), Some("Bearer tok"));
        assert_eq!(calls[0].body.as_ref().unwrap()["documentTitle"], "Paper");
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_invalidates_session_and_stops() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![status(401)]));
        let session = Arc::new(Session::with_token("stale"));
        assert!(!recorder(t.clone(), session.clone()).record(record()).await);
        assert_eq!(t.calls_to(URL), 1);
        assert_eq!(session.token(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_delay_then_gives_up() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![refused()]));
        let start = Instant::now();
        let ok = recorder(t.clone(), Arc::new(Session::with_token("tok")))
            .record(record())
            .await;
        let elapsed = start.elapsed().as_millis();
        assert!(!ok);
        assert_eq!(t.calls_to(URL), 3);
        // 1 s before the 2nd attempt, 2 s before the 3rd
        assert!((3000..3010).contains(&elapsed), "elapsed {elapsed}ms");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![status(502), ok()]));
        assert!(recorder(t.clone(), Arc::new(Session::with_token("tok"))).record(record()).await);
        assert_eq!(t.calls_to(URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn client_rejection_is_not_retried() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![status(422)]));
        assert!(!recorder(t.clone(), Arc::new(Session::with_token("tok"))).record(record()).await);
        assert_eq!(t.calls_to(URL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_recorder_is_a_no_op() {
        let t = Arc::new(ScriptedTransport::new());
        let r = DownloadRecorder::new(
            t.clone(),
            Arc::new(Session::with_token("tok")),
            None,
            RecorderPolicy::default(),
        );
        assert!(!r.is_enabled());
        assert!(!r.record(record()).await);
        assert_eq!(t.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_handle_reports_outcome() {
        let t = Arc::new(ScriptedTransport::new().script(URL, vec![ok()]));
        let handle = recorder(t, Arc::new(Session::with_token("tok"))).spawn(record());
        assert!(handle.wait().await);
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogSink(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
        type Writer = LogSink;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn give_up_is_logged_as_recording_failed() {
        let sink = LogSink::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let t = Arc::new(ScriptedTransport::new().script(URL, vec![status(422)]));
        assert!(!recorder(t, Arc::new(Session::with_token("tok"))).record(record()).await);

        let logs = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("gave up after 1 attempt(s)"), "{logs}");
        assert!(logs.contains("kind=RecordingFailed"), "{logs}");
    }

    #[test]
    fn errors_classify_as_recording_failed() {
        assert_eq!(RecordingError::Unauthorized.kind(), ErrorKind::RecordingFailed);
        assert!(RecordingError::Timeout(10).is_retryable());
        assert!(!RecordingError::NotRecorded("dup".into()).is_retryable());
    }
}
