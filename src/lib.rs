//! # paperpress
//!
//! Resilient generation of research-paper documents (DOCX and PDF) through a
//! remote document-generation backend.
//!
//! ## Why this crate?
//!
//! The backend that actually lays out the paper runs on serverless
//! infrastructure: it cold-starts, rate-limits, times out and occasionally
//! disappears behind a 502. Calling it directly from an editor means every
//! caller has to reinvent retries, fail-over and input hygiene. This crate
//! wraps that in one pipeline that validates and repairs the document first,
//! retries transient failures with exponential backoff, fails over between
//! endpoints, derives PDFs from DOCX, and records downloads without ever
//! letting that bookkeeping fail the user's request.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document
//!  │
//!  ├─ 1. Validate  structural checks; sanitize once and re-check
//!  ├─ 2. Generate  POST {..document, format: "docx"} over the endpoint chain
//!  ├─ 3. Convert   POST {format: "docx-to-pdf", docx_data} (PDF only)
//!  ├─ 4. Record    detached download history (download mode only)
//!  └─ 5. Output    artifact (inline bytes or download URL) + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperpress::{
//!     Document, GenerationMode, GenerationPipeline, OutputFormat, PipelineConfig, Session,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .generator_endpoint("https://backend.example.com/api/document-generator")
//!         .generator_endpoint("https://backup.example.com/api/document-generator")
//!         .build()?;
//!     let pipeline = GenerationPipeline::from_config(config, Arc::new(Session::anonymous()))?;
//!
//!     let doc = Document::from_json(&std::fs::read_to_string("paper.json")?)?;
//!     let output = pipeline.generate(&doc, OutputFormat::Pdf, GenerationMode::Download).await?;
//!     pipeline.save_artifact(&output.artifact, "paper.pdf").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paperpress` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! paperpress = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod generate;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    GenerationMode, OutputFormat, PipelineConfig, PipelineConfigBuilder, RecorderPolicy,
    RetryPolicy, Stage,
};
pub use document::outline::{Outline, OutlineError};
pub use document::{Document, DocumentMetadata};
pub use error::{ErrorKind, FailureKind, PaperpressError, RequestError, RouteError};
pub use generate::{generate_sync, is_valid_email, GenerationPipeline, HealthReport};
pub use input::load_document;
pub use output::{Artifact, ArtifactPayload, GenerationOutput, GenerationStats};
pub use pipeline::executor::RequestExecutor;
pub use pipeline::fallback::{FallbackRouter, Routed};
pub use pipeline::recorder::{DownloadRecord, DownloadRecorder, RecordingHandle};
pub use pipeline::transport::{
    HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError,
};
pub use pipeline::validate::{sanitize, validate, ValidationReport};
pub use progress::{GenerationObserver, NoopObserver, ObserverHandle};
pub use session::{Session, SessionProvider};
