//! Observer trait for generation stage events.
//!
//! Inject an [`Arc<dyn GenerationObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to receive events as
//! the pipeline moves through its stages.
//!
//! # Example
//!
//! ```rust
//! use paperpress::{GenerationObserver, PipelineConfig, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     seen: AtomicUsize,
//! }
//!
//! impl GenerationObserver for StageCounter {
//!     fn on_stage(&self, _document_id: &str, _stage: Stage) {
//!         self.seen.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .generator_endpoint("https://backend.example.com/api/document-generator")
//!     .observer(Arc::new(StageCounter { seen: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::config::Stage;
use std::sync::Arc;

/// Called by the pipeline as a generation progresses.
///
/// Implementations must be `Send + Sync`: generations for different
/// documents may run concurrently. All methods default to no-ops.
pub trait GenerationObserver: Send + Sync {
    /// A stage is about to start.
    fn on_stage(&self, document_id: &str, stage: Stage) {
        let _ = (document_id, stage);
    }

    /// The executor is about to sleep before retrying `url`.
    ///
    /// # Arguments
    /// * `retry`    — 1-based retry number
    /// * `delay_ms` — backoff delay about to be slept
    fn on_retry(&self, url: &str, retry: u32, delay_ms: u64) {
        let _ = (url, retry, delay_ms);
    }

    /// The artifact is ready.
    fn on_complete(&self, document_id: &str, file_size: u64) {
        let _ = (document_id, file_size);
    }

    /// The generation failed in `stage`.
    fn on_failed(&self, document_id: &str, stage: Stage, error: &str) {
        let _ = (document_id, stage, error);
    }
}

/// No-op implementation for callers that don't need events.
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {}

/// Type stored in [`crate::config::PipelineConfig`].
pub type ObserverHandle = Arc<dyn GenerationObserver>;
