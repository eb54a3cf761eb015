//! Document generation entry points.
//!
//! [`GenerationPipeline::generate`] walks a fixed stage machine:
//!
//! ```text
//! Validating ─► Generating (DOCX) ─► [ConvertingFormat (PDF)] ─► Recording ─► Done
//! ```
//!
//! The backend only ever builds a DOCX from the document; a PDF is derived
//! from that DOCX by a second, independently retried call. Recording is
//! spawned detached after the artifact exists and cannot fail the call.

use crate::config::{GenerationMode, OutputFormat, PipelineConfig, Stage};
use crate::document::Document;
use crate::error::{PaperpressError, RouteError};
use crate::output::{Artifact, ArtifactPayload, GenerationOutput, GenerationStats};
use crate::pipeline::executor::RequestExecutor;
use crate::pipeline::fallback::FallbackRouter;
use crate::pipeline::payload::{encode_bytes, BackendResponse, ConvertRequest, GenerateRequest};
use crate::pipeline::recorder::{DownloadRecord, DownloadRecorder};
use crate::pipeline::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::pipeline::validate::{sanitize, validate};
use crate::progress::GenerationObserver;
use crate::session::SessionProvider;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Content type the conversion stage must return.
pub const PDF_MIME: &str = "application/pdf";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$",
    )
    .unwrap()
});

/// Result of probing one health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub url: String,
    pub healthy: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Drives documents through validation, generation, conversion and recording.
pub struct GenerationPipeline {
    config: PipelineConfig,
    transport: Arc<dyn Transport>,
    router: FallbackRouter,
    /// Fetches backend-issued download URLs; never sends the session token.
    downloader: RequestExecutor,
    recorder: DownloadRecorder,
    in_flight: Mutex<HashSet<String>>,
}

impl GenerationPipeline {
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        let downloader = RequestExecutor::new(Arc::clone(&transport), config.retry.clone())
            .with_observer(config.observer.clone());
        let executor = RequestExecutor::new(Arc::clone(&transport), config.retry.clone())
            .with_session(Arc::clone(&session))
            .with_observer(config.observer.clone());
        let recorder = DownloadRecorder::new(
            Arc::clone(&transport),
            session,
            config.record_endpoint.clone(),
            config.recorder.clone(),
        );
        Self {
            router: FallbackRouter::new(executor),
            downloader,
            recorder,
            transport,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Pipeline over a real HTTP client.
    pub fn from_config(
        config: PipelineConfig,
        session: Arc<dyn SessionProvider>,
    ) -> Result<Self, PaperpressError> {
        let transport = ReqwestTransport::new(Duration::from_secs(10))
            .map_err(|e| PaperpressError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self::new(config, Arc::new(transport), session))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Generate `format` from `document`.
    ///
    /// The caller's document is never modified; repairs are applied to a
    /// snapshot. For [`GenerationMode::Download`] the returned output may
    /// carry a [`crate::pipeline::recorder::RecordingHandle`].
    ///
    /// # Errors
    /// * `ValidationFailed` — errors remained after one sanitize pass;
    ///   nothing was sent.
    /// * `AlreadyInProgress` — a call for the same document is running.
    /// * `NetworkTransient` / `NetworkFatal` — generation or conversion
    ///   failed after retries and fallback.
    /// * `ConversionFormatMismatch` — the converter did not return a PDF.
    pub async fn generate(
        &self,
        document: &Document,
        format: OutputFormat,
        mode: GenerationMode,
    ) -> Result<GenerationOutput, PaperpressError> {
        let key = document.surface_key().to_string();
        let _guard = self.acquire(&key)?;
        info!("Generating {} ({}) for '{}'", format, mode.as_str(), key);

        let result = self.run(document.clone(), format, mode, &key).await;
        match &result {
            Ok(out) => self.notify(|o| o.on_complete(&key, out.artifact.file_size)),
            Err(e) => {
                warn!("Generation for '{}' failed: {}", key, e);
                let stage = stage_of(e);
                let msg = e.to_string();
                self.notify(|o| o.on_failed(&key, stage, &msg));
            }
        }
        result
    }

    async fn run(
        &self,
        snapshot: Document,
        format: OutputFormat,
        mode: GenerationMode,
        key: &str,
    ) -> Result<GenerationOutput, PaperpressError> {
        let start = Instant::now();
        let mut stats = GenerationStats::default();

        // ── Step 1: Validate, sanitizing once if needed ──────────────────────
        self.notify(|o| o.on_stage(key, Stage::Validating));
        let doc = self.prepare(snapshot, &mut stats)?;

        // ── Step 2: Generate the base DOCX ──────────────────────────────────
        self.notify(|o| o.on_stage(key, Stage::Generating));
        let docx = self.generate_docx(&doc, mode, &mut stats).await?;

        // ── Step 3: Derive the PDF ──────────────────────────────────────────
        let artifact = match format {
            OutputFormat::Docx => docx,
            OutputFormat::Pdf => {
                self.notify(|o| o.on_stage(key, Stage::ConvertingFormat));
                let pdf = self.convert_to_pdf(&docx, mode, &mut stats).await?;
                stats.converted = true;
                pdf
            }
        };

        // ── Step 4: Record the download (detached) ──────────────────────────
        let recording = if mode == GenerationMode::Download && self.recorder.is_enabled() {
            self.notify(|o| o.on_stage(key, Stage::Recording));
            let file_data = match (&artifact.payload, self.config.attach_file_to_record) {
                (ArtifactPayload::Inline(bytes), true) => Some(encode_bytes(bytes)),
                _ => None,
            };
            Some(self.recorder.spawn(DownloadRecord {
                document_title: doc.title.clone(),
                file_format: format.as_str().to_string(),
                file_size: artifact.file_size,
                file_data,
                document_metadata: doc.metadata(),
            }))
        } else {
            None
        };

        self.notify(|o| o.on_stage(key, Stage::Done));
        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Generated {} for '{}': {} bytes in {}ms",
            format, key, artifact.file_size, stats.duration_ms
        );

        Ok(GenerationOutput {
            artifact,
            stats,
            recording,
        })
    }

    /// Validate; on failure sanitize once and re-validate.
    fn prepare(
        &self,
        doc: Document,
        stats: &mut GenerationStats,
    ) -> Result<Document, PaperpressError> {
        let report = validate(&doc);
        if report.is_valid {
            stats.warnings = report.warnings;
            return Ok(doc);
        }

        debug!("Validation found {} error(s); sanitizing", report.errors.len());
        let repaired = sanitize(&doc);
        let report = validate(&repaired);
        if !report.is_valid {
            return Err(PaperpressError::ValidationFailed {
                errors: report.errors,
            });
        }
        info!("Document repaired by sanitize");
        stats.sanitized = true;
        stats.warnings = report.warnings;
        Ok(repaired)
    }

    async fn generate_docx(
        &self,
        doc: &Document,
        mode: GenerationMode,
        stats: &mut GenerationStats,
    ) -> Result<Artifact, PaperpressError> {
        let body = serde_json::to_value(GenerateRequest::docx(doc, mode))
            .map_err(|e| PaperpressError::Internal(format!("serialize document: {e}")))?;
        let request = preview_header(
            HttpRequest::post_json(primary(&self.config.generator_endpoints, "generator")?, body),
            mode,
        );

        let routed = self
            .router
            .execute_chain(&request, &self.config.generator_endpoints)
            .await
            .map_err(|e| PaperpressError::from_route(Stage::Generating, e))?;
        stats.fallbacks += routed.failed_over.len() as u32;

        let response = BackendResponse::parse(Stage::Generating, &routed.response)?;
        artifact_from(OutputFormat::Docx, Stage::Generating, &response)
    }

    async fn convert_to_pdf(
        &self,
        docx: &Artifact,
        mode: GenerationMode,
        stats: &mut GenerationStats,
    ) -> Result<Artifact, PaperpressError> {
        let docx_bytes = self.artifact_bytes(docx, Stage::ConvertingFormat).await?;
        let targets = self.config.conversion_targets();
        let body = serde_json::to_value(ConvertRequest::docx_to_pdf(&docx_bytes, mode))
            .map_err(|e| PaperpressError::Internal(format!("serialize conversion: {e}")))?;
        let request = preview_header(
            HttpRequest::post_json(primary(targets, "conversion")?, body),
            mode,
        );

        let routed = self
            .router
            .execute_chain(&request, targets)
            .await
            .map_err(|e| PaperpressError::from_route(Stage::ConvertingFormat, e))?;
        stats.fallbacks += routed.failed_over.len() as u32;

        let response = BackendResponse::parse(Stage::ConvertingFormat, &routed.response)?;
        match response.file_type.as_deref() {
            Some(PDF_MIME) => {}
            other => {
                return Err(PaperpressError::ConversionFormatMismatch {
                    expected: PDF_MIME.to_string(),
                    actual: other.unwrap_or("<missing>").to_string(),
                })
            }
        }
        artifact_from(OutputFormat::Pdf, Stage::ConvertingFormat, &response)
    }

    /// The artifact's bytes, downloading a remote artifact first.
    async fn artifact_bytes<'a>(
        &self,
        artifact: &'a Artifact,
        stage: Stage,
    ) -> Result<Cow<'a, [u8]>, PaperpressError> {
        match &artifact.payload {
            ArtifactPayload::Inline(bytes) => Ok(Cow::Borrowed(bytes)),
            ArtifactPayload::Remote(url) => {
                debug!("Fetching {} artifact from {}", artifact.format, url);
                let response = self
                    .downloader
                    .execute(&HttpRequest::get(url.as_str()))
                    .await
                    .map_err(|e| PaperpressError::from_route(stage, RouteError::Request(e)))?;
                Ok(Cow::Owned(response.body))
            }
        }
    }

    /// Write `artifact` to `path`, atomically. Returns bytes written.
    ///
    /// Remote artifacts are downloaded through the executor first.
    pub async fn save_artifact(
        &self,
        artifact: &Artifact,
        path: impl AsRef<Path>,
    ) -> Result<u64, PaperpressError> {
        let path = path.as_ref();
        let bytes = self.artifact_bytes(artifact, Stage::Fetching).await?;
        let write_err = |source: std::io::Error| PaperpressError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        // Write beside the target, then rename over it.
        let tmp_path = path.with_extension(format!("{}.tmp", artifact.format.as_str()));
        tokio::fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(bytes.len() as u64)
    }

    /// Have the backend email the generated document to `recipient`.
    ///
    /// Returns the backend's confirmation message.
    pub async fn send_email(
        &self,
        document: &Document,
        recipient: &str,
        format: OutputFormat,
    ) -> Result<String, PaperpressError> {
        let recipient = recipient.trim();
        if !is_valid_email(recipient) {
            return Err(PaperpressError::InvalidRecipient {
                email: recipient.to_string(),
            });
        }
        let email_url = primary(&self.config.email_endpoints, "email")?;

        let key = document.surface_key().to_string();
        let _guard = self.acquire(&key)?;
        info!("Emailing {} of '{}' to {}", format, key, recipient);

        let mut stats = GenerationStats::default();
        self.notify(|o| o.on_stage(&key, Stage::Validating));
        let doc = self.prepare(document.clone(), &mut stats)?;

        self.notify(|o| o.on_stage(&key, Stage::Emailing));
        let body = serde_json::to_value(GenerateRequest::email(&doc, recipient, format))
            .map_err(|e| PaperpressError::Internal(format!("serialize document: {e}")))?;
        let request = HttpRequest::post_json(email_url, body);
        let routed = self
            .router
            .execute_chain(&request, &self.config.email_endpoints)
            .await
            .map_err(|e| PaperpressError::from_route(Stage::Emailing, e))?;

        let response = BackendResponse::parse(Stage::Emailing, &routed.response)?;
        self.notify(|o| o.on_stage(&key, Stage::Done));
        Ok(response
            .message
            .unwrap_or_else(|| format!("Document sent to {recipient}")))
    }

    /// One unretried GET per health endpoint. Never fails.
    pub async fn check_health(&self) -> Vec<HealthReport> {
        let mut reports = Vec::with_capacity(self.config.health_endpoints.len());
        for url in &self.config.health_endpoints {
            let request = HttpRequest::get(url.as_str());
            let start = Instant::now();
            let outcome =
                tokio::time::timeout(self.config.retry.timeout(), self.transport.send(&request))
                    .await;
            let latency_ms = start.elapsed().as_millis() as u64;
            let report = match outcome {
                Ok(Ok(response)) => HealthReport {
                    url: url.clone(),
                    healthy: response.is_success(),
                    status: Some(response.status),
                    latency_ms,
                    error: (!response.is_success()).then(|| response.summary()),
                },
                Ok(Err(e)) => HealthReport {
                    url: url.clone(),
                    healthy: false,
                    status: None,
                    latency_ms,
                    error: Some(e.to_string()),
                },
                Err(_) => HealthReport {
                    url: url.clone(),
                    healthy: false,
                    status: None,
                    latency_ms,
                    error: Some(format!("timed out after {}ms", self.config.retry.timeout_ms)),
                },
            };
            debug!("Health {}: {:?}", url, report.status);
            reports.push(report);
        }
        reports
    }

    fn acquire(&self, key: &str) -> Result<InFlightGuard<'_>, PaperpressError> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.to_string()) {
            return Err(PaperpressError::AlreadyInProgress {
                document_id: key.to_string(),
            });
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key: key.to_string(),
        })
    }

    fn notify(&self, f: impl FnOnce(&dyn GenerationObserver)) {
        if let Some(ref obs) = self.config.observer {
            f(obs.as_ref());
        }
    }
}

/// Removes its document id from the in-flight set on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

/// Synchronous wrapper around [`GenerationPipeline::generate`].
///
/// Creates a temporary tokio runtime internally. The download recording,
/// if any, is awaited before returning because the runtime does not
/// outlive this call; the returned output never carries a handle.
pub fn generate_sync(
    pipeline: &GenerationPipeline,
    document: &Document,
    format: OutputFormat,
    mode: GenerationMode,
) -> Result<GenerationOutput, PaperpressError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PaperpressError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(async {
            let mut output = pipeline.generate(document, format, mode).await?;
            if let Some(handle) = output.recording.take() {
                handle.wait().await;
            }
            Ok(output)
        })
}

/// Whether `email` looks like a deliverable address.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn preview_header(request: HttpRequest, mode: GenerationMode) -> HttpRequest {
    match mode {
        GenerationMode::Preview => request.header("X-Preview", "true"),
        GenerationMode::Download => request,
    }
}

fn primary<'a>(urls: &'a [String], what: &str) -> Result<&'a str, PaperpressError> {
    urls.first()
        .map(String::as_str)
        .ok_or_else(|| PaperpressError::InvalidConfig(format!("No {what} endpoint configured")))
}

fn artifact_from(
    format: OutputFormat,
    stage: Stage,
    response: &BackendResponse,
) -> Result<Artifact, PaperpressError> {
    if let Some(bytes) = response.decode_file(stage)? {
        return Ok(Artifact::inline(format, bytes));
    }
    if let Some(url) = response.remote_url() {
        return Ok(Artifact::remote(
            format,
            url.to_string(),
            response.file_size.unwrap_or(0),
        ));
    }
    Err(PaperpressError::MalformedResponse {
        stage,
        detail: "response carries neither file_data nor download_url".into(),
    })
}

/// Stage a failed call was in, for observer reporting.
fn stage_of(e: &PaperpressError) -> Stage {
    match e {
        PaperpressError::NetworkTransient { stage, .. }
        | PaperpressError::NetworkFatal { stage, .. }
        | PaperpressError::MalformedResponse { stage, .. }
        | PaperpressError::BackendRejected { stage, .. } => *stage,
        PaperpressError::ConversionFormatMismatch { .. } => Stage::ConvertingFormat,
        _ => Stage::Validating,
    }
}
