//! Configuration types for document generation.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Endpoints are an explicit ordered list:
//! the first entry is the primary, later entries are fallback candidates
//! tried only after a server-class failure.

use crate::error::PaperpressError;
use crate::input::is_url;
use crate::progress::ObserverHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Retry policy for [`crate::pipeline::executor::RequestExecutor`].
///
/// Delay before retry `n` (1-based) is
/// `min(base_delay_ms * backoff_multiplier^(n-1), max_delay_ms)`.
/// With the defaults that is 1 s → 2 s → 4 s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Default: 3.
    pub max_retries: u32,
    /// Delay before the first retry. Default: 1000 ms.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay. Default: 10 000 ms.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays. Default: 2.
    pub backoff_multiplier: f64,
    /// Per-attempt timeout. Default: 30 000 ms.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry policy of the download recorder. Deliberately separate from
/// [`RetryPolicy`]: recording has its own small loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderPolicy {
    /// Total attempts. Default: 3.
    pub max_attempts: u32,
    /// Delay before retry `n` is `delay_ms * n`. Default: 1000 ms.
    pub delay_ms: u64,
    /// Per-attempt timeout. Default: 15 000 ms.
    pub timeout_ms: u64,
}

impl Default for RecorderPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            timeout_ms: 15_000,
        }
    }
}

/// Configuration for a [`crate::generate::GenerationPipeline`].
///
/// # Example
/// ```rust
/// use paperpress::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .generator_endpoint("https://backend.example.com/api/document-generator")
///     .generator_endpoint("https://backup.example.com/api/document-generator")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.generator_endpoints.len(), 2);
/// ```
#[derive(Clone, Default)]
pub struct PipelineConfig {
    /// Ordered generator endpoints. The first is the primary.
    pub generator_endpoints: Vec<String>,

    /// Ordered `docx-to-pdf` endpoints. Empty means "same as generator".
    pub conversion_endpoints: Vec<String>,

    /// Ordered email delivery endpoints. Empty disables email delivery.
    pub email_endpoints: Vec<String>,

    /// URLs probed by `check_health`.
    pub health_endpoints: Vec<String>,

    /// Download history endpoint. `None` disables recording.
    pub record_endpoint: Option<String>,

    /// Retry policy for generation and conversion calls.
    pub retry: RetryPolicy,

    /// Retry policy for download recording.
    pub recorder: RecorderPolicy,

    /// Attach the base64 artifact to the download record (needed when the
    /// history service emails the file). Default: true.
    pub attach_file_to_record: bool,

    /// Optional stage observer.
    pub observer: Option<ObserverHandle>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("generator_endpoints", &self.generator_endpoints)
            .field("conversion_endpoints", &self.conversion_endpoints)
            .field("email_endpoints", &self.email_endpoints)
            .field("health_endpoints", &self.health_endpoints)
            .field("record_endpoint", &self.record_endpoint)
            .field("retry", &self.retry)
            .field("recorder", &self.recorder)
            .field("attach_file_to_record", &self.attach_file_to_record)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn GenerationObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self {
                attach_file_to_record: true,
                ..Self::default()
            },
        }
    }

    /// Endpoints used for the `docx-to-pdf` stage.
    pub fn conversion_targets(&self) -> &[String] {
        if self.conversion_endpoints.is_empty() {
            &self.generator_endpoints
        } else {
            &self.conversion_endpoints
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn generator_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.generator_endpoints.push(url.into());
        self
    }

    pub fn generator_endpoints<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .generator_endpoints
            .extend(urls.into_iter().map(Into::into));
        self
    }

    pub fn conversion_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.conversion_endpoints.push(url.into());
        self
    }

    pub fn email_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.email_endpoints.push(url.into());
        self
    }

    pub fn health_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.health_endpoints.push(url.into());
        self
    }

    pub fn record_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.record_endpoint = Some(url.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Retries after the first attempt (clamped to 0–10).
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n.min(10);
        self
    }

    /// First backoff delay (clamped to at most 60 s).
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms.min(60_000);
        self
    }

    /// Backoff cap (clamped to at most 5 min).
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay_ms = ms.min(300_000);
        self
    }

    pub fn backoff_multiplier(mut self, m: f64) -> Self {
        self.config.retry.backoff_multiplier = m;
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.retry.timeout_ms = ms;
        self
    }

    pub fn recorder_policy(mut self, policy: RecorderPolicy) -> Self {
        self.config.recorder = RecorderPolicy {
            max_attempts: policy.max_attempts.max(1),
            ..policy
        };
        self
    }

    pub fn attach_file_to_record(mut self, v: bool) -> Self {
        self.config.attach_file_to_record = v;
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PaperpressError> {
        let c = &self.config;
        if c.generator_endpoints.is_empty() {
            return Err(PaperpressError::InvalidConfig(
                "At least one generator endpoint is required".into(),
            ));
        }
        let all_urls = c
            .generator_endpoints
            .iter()
            .chain(&c.conversion_endpoints)
            .chain(&c.email_endpoints)
            .chain(&c.health_endpoints)
            .chain(c.record_endpoint.iter());
        for url in all_urls {
            if !is_url(url) {
                return Err(PaperpressError::InvalidConfig(format!(
                    "Endpoint must be an HTTP/HTTPS URL, got '{url}'"
                )));
            }
        }
        if c.retry.backoff_multiplier.is_nan() || c.retry.backoff_multiplier < 1.0 {
            return Err(PaperpressError::InvalidConfig(format!(
                "Backoff multiplier must be ≥ 1, got {}",
                c.retry.backoff_multiplier
            )));
        }
        if c.retry.timeout_ms == 0 || c.recorder.timeout_ms == 0 {
            return Err(PaperpressError::InvalidConfig(
                "Timeouts must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Requested artifact format. PDF is always derived from a DOCX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Docx,
    Pdf,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller intends to do with the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Show in-app. Never recorded.
    #[default]
    Preview,
    /// Hand to the user as a file. Recorded on success.
    Download,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Preview => "preview",
            GenerationMode::Download => "download",
        }
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Validating,
    Generating,
    ConvertingFormat,
    Recording,
    Done,
    /// Outside `generate`: email delivery.
    Emailing,
    /// Outside `generate`: fetching a remote artifact.
    Fetching,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validating => "validation",
            Stage::Generating => "DOCX generation",
            Stage::ConvertingFormat => "DOCX-to-PDF conversion",
            Stage::Recording => "download recording",
            Stage::Done => "done",
            Stage::Emailing => "email delivery",
            Stage::Fetching => "artifact download",
        };
        f.write_str(s)
    }
}
