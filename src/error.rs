//! Error types for the paperpress library.
//!
//! Three layers of error reflect three distinct failure scopes:
//!
//! * [`RequestError`] — one logical HTTP call against one URL failed after
//!   the executor's retry budget (or immediately, for non-retryable
//!   outcomes). Carries the attempt count and the classified failure.
//!
//! * [`RouteError`] — a fallback chain failed. Either the first failure was
//!   not eligible for fail-over (returned unchanged) or every candidate
//!   failed, in which case all underlying messages are kept.
//!
//! * [`PaperpressError`] — **Fatal** for one `generate` call. Each variant
//!   maps onto one [`ErrorKind`] so callers can decide how to present it
//!   (blocking message, silent no-op, ...).
//!
//! Recording failures never leave the recorder; see
//! [`crate::pipeline::recorder::RecordingError`].

use crate::config::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Statuses worth retrying against the same URL.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Coarse classification used by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural problems in the document; nothing was sent.
    ValidationFailed,
    /// Timeouts, 5xx, 408/429 that survived retries and fallback.
    NetworkTransient,
    /// 4xx, malformed or rejected responses. Not retried.
    NetworkFatal,
    /// The converter answered with something other than a PDF.
    ConversionFormatMismatch,
    /// Download/email record failed. Logged only.
    RecordingFailed,
    /// A generation for the same document is already running.
    AlreadyInProgress,
    /// The document could not be loaded.
    Input,
    /// The pipeline configuration is unusable.
    Config,
    /// Unexpected internal fault.
    Internal,
}

/// Transport-level failure class reported by a [`crate::pipeline::transport::Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The transport's own timer fired.
    Timeout,
    /// Could not establish a connection.
    Connect,
    /// The request was aborted mid-flight.
    Aborted,
    /// Connection reset, truncated body and similar I/O trouble.
    Network,
    /// Anything else (bad URL, request construction). Not transient.
    Other,
}

impl TransportErrorKind {
    /// Whether this failure signature is expected to clear on retry.
    pub fn is_transient(self) -> bool {
        !matches!(self, TransportErrorKind::Other)
    }
}

/// The classified outcome of a failed HTTP attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FailureKind {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The attempt exceeded the executor's timeout.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The transport failed before a status was received.
    #[error("transport error ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
}

impl FailureKind {
    /// Retryable against the same URL.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Status { status, .. } => RETRYABLE_STATUSES.contains(status),
            FailureKind::Timeout { .. } => true,
            FailureKind::Transport { kind, .. } => kind.is_transient(),
        }
    }

    /// Eligible for fail-over to another URL: server-class status or no
    /// status at all.
    pub fn is_server_class(&self) -> bool {
        match self {
            FailureKind::Status { status, .. } => *status >= 500,
            FailureKind::Timeout { .. } | FailureKind::Transport { .. } => true,
        }
    }

    /// Status code, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            FailureKind::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// One logical request failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{url}: {kind} (after {attempts} attempt(s))")]
pub struct RequestError {
    pub url: String,
    pub attempts: u32,
    pub kind: FailureKind,
}

impl RequestError {
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn is_server_class(&self) -> bool {
        self.kind.is_server_class()
    }
}

/// A fallback chain failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Returned exactly as the executor produced it: the failure was
    /// client-class or there was no further candidate.
    #[error(transparent)]
    Request(RequestError),

    /// Every candidate failed; failures are in attempt order.
    #[error("all {} endpoints failed: {}", .0.len(), join_failures(.0))]
    Exhausted(Vec<RequestError>),
}

impl RouteError {
    /// Every underlying failure, in attempt order.
    pub fn failures(&self) -> &[RequestError] {
        match self {
            RouteError::Request(e) => std::slice::from_ref(e),
            RouteError::Exhausted(all) => all,
        }
    }

    /// True when the last failure is of a kind that retry or fallback could
    /// have fixed; the chain simply ran out of budget.
    pub fn is_transient(&self) -> bool {
        self.failures().last().is_some_and(|last| {
            last.is_retryable() || last.kind.status().is_some_and(|s| s >= 500)
        })
    }
}

fn join_failures(failures: &[RequestError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// All fatal errors returned by the paperpress library.
#[derive(Debug, Error)]
pub enum PaperpressError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Document file was not found at the given path.
    #[error("Document file not found: '{path}'\nCheck the path exists and is readable.")]
    DocumentNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download document '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// The input is not a document in the expected JSON shape.
    #[error("Invalid document JSON in '{source_name}': {detail}")]
    InvalidDocument { source_name: String, detail: String },

    // ── Validation ────────────────────────────────────────────────────────
    /// Structural errors that survived one sanitize pass.
    #[error("Document failed validation: {}", .errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    /// The recipient of an email delivery is not a usable address.
    #[error("Invalid recipient email address: '{email}'")]
    InvalidRecipient { email: String },

    // ── Network ───────────────────────────────────────────────────────────
    /// Transient failures exhausted retries and fallback.
    #[error("{stage} failed after retries: {source}")]
    NetworkTransient {
        stage: Stage,
        #[source]
        source: RouteError,
    },

    /// A non-retryable network failure (4xx, bad route).
    #[error("{stage} failed: {source}")]
    NetworkFatal {
        stage: Stage,
        #[source]
        source: RouteError,
    },

    /// The backend answered 2xx but the body was unusable.
    #[error("{stage}: malformed backend response: {detail}")]
    MalformedResponse { stage: Stage, detail: String },

    /// The backend answered `success: false`.
    #[error("{stage}: backend rejected the request: {message}")]
    BackendRejected { stage: Stage, message: String },

    /// The conversion endpoint returned the wrong kind of file.
    #[error("Conversion returned '{actual}', expected '{expected}'\nThe conversion backend violated its contract.")]
    ConversionFormatMismatch { expected: String, actual: String },

    // ── Concurrency ───────────────────────────────────────────────────────
    /// A generation for this document is already running.
    #[error("A generation for document '{document_id}' is already in progress")]
    AlreadyInProgress { document_id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaperpressError {
    /// Map onto the presentation taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaperpressError::DocumentNotFound { .. }
            | PaperpressError::PermissionDenied { .. }
            | PaperpressError::DownloadFailed { .. }
            | PaperpressError::InvalidDocument { .. } => ErrorKind::Input,
            PaperpressError::ValidationFailed { .. } | PaperpressError::InvalidRecipient { .. } => {
                ErrorKind::ValidationFailed
            }
            PaperpressError::NetworkTransient { .. } => ErrorKind::NetworkTransient,
            PaperpressError::NetworkFatal { .. }
            | PaperpressError::MalformedResponse { .. }
            | PaperpressError::BackendRejected { .. } => ErrorKind::NetworkFatal,
            PaperpressError::ConversionFormatMismatch { .. } => ErrorKind::ConversionFormatMismatch,
            PaperpressError::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            PaperpressError::InvalidConfig(_) => ErrorKind::Config,
            PaperpressError::OutputWriteFailed { .. } | PaperpressError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Wrap a route failure for `stage`, picking transient or fatal.
    pub fn from_route(stage: Stage, source: RouteError) -> Self {
        if source.is_transient() {
            PaperpressError::NetworkTransient { stage, source }
        } else {
            PaperpressError::NetworkFatal { stage, source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(url: &str, status: u16) -> RequestError {
        RequestError {
            url: url.into(),
            attempts: 1,
            kind: FailureKind::Status {
                status,
                message: "boom".into(),
            },
        }
    }

    #[test]
    fn retryable_statuses() {
        for s in RETRYABLE_STATUSES {
            assert!(status_error("u", s).is_retryable(), "{s}");
        }
        for s in [400, 401, 403, 404, 422, 501] {
            assert!(!status_error("u", s).is_retryable(), "{s}");
        }
    }

    #[test]
    fn server_class_split() {
        assert!(status_error("u", 500).is_server_class());
        assert!(status_error("u", 503).is_server_class());
        assert!(!status_error("u", 404).is_server_class());
        assert!(!status_error("u", 429).is_server_class());
        let timeout = RequestError {
            url: "u".into(),
            attempts: 4,
            kind: FailureKind::Timeout { timeout_ms: 30_000 },
        };
        assert!(timeout.is_server_class());
        assert!(timeout.is_retryable());
    }

    #[test]
    fn other_transport_errors_are_not_transient() {
        let e = FailureKind::Transport {
            kind: TransportErrorKind::Other,
            message: "relative URL without a base".into(),
        };
        assert!(!e.is_retryable());
        assert!(e.is_server_class());
    }

    #[test]
    fn exhausted_route_keeps_every_message() {
        let e = RouteError::Exhausted(vec![
            status_error("https://primary", 503),
            status_error("https://fallback", 502),
        ]);
        let msg = e.to_string();
        assert!(msg.contains("https://primary"), "got: {msg}");
        assert!(msg.contains("https://fallback"), "got: {msg}");
        assert!(msg.contains("503") && msg.contains("502"), "got: {msg}");
        assert_eq!(e.failures().len(), 2);
    }

    #[test]
    fn route_transience_follows_last_failure() {
        assert!(!RouteError::Request(status_error("u", 404)).is_transient());
        assert!(RouteError::Request(status_error("u", 503)).is_transient());
        let both_down = vec![status_error("a", 503), status_error("b", 500)];
        assert!(RouteError::Exhausted(both_down).is_transient());
        let ends_in_client_error = vec![status_error("a", 503), status_error("b", 404)];
        assert!(!RouteError::Exhausted(ends_in_client_error).is_transient());
    }

    #[test]
    fn validation_failed_display_joins_errors() {
        let e = PaperpressError::ValidationFailed {
            errors: vec!["Document title is required".into(), "At least one author".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("title is required; At least one author"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        let fatal = PaperpressError::from_route(
            Stage::Generating,
            RouteError::Request(status_error("u", 404)),
        );
        assert_eq!(fatal.kind(), ErrorKind::NetworkFatal);
        let transient = PaperpressError::from_route(
            Stage::Generating,
            RouteError::Request(status_error("u", 504)),
        );
        assert_eq!(transient.kind(), ErrorKind::NetworkTransient);
        let busy = PaperpressError::AlreadyInProgress { document_id: "d1".into() };
        assert_eq!(busy.kind(), ErrorKind::AlreadyInProgress);
        assert!(busy.to_string().contains("d1"));
    }
}
