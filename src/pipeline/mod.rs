//! Pipeline building blocks for resilient document generation.
//!
//! Each submodule owns one concern and is testable on its own against a
//! scripted [`transport::Transport`].
//!
//! ## Data Flow
//!
//! ```text
//! validate ──▶ executor ──▶ fallback ──▶ (artifact) ──▶ recorder
//! (repair)     (retry)      (fail-over)                 (detached)
//!                  │
//!              transport
//!              (reqwest)
//! ```
//!
//! 1. [`validate`]  — structural checks and the idempotent repair pass; runs
//!    before any byte goes on the wire
//! 2. [`transport`] — the network seam; one request, one response
//! 3. [`executor`]  — per-attempt timeout, failure classification and
//!    exponential backoff against a single URL
//! 4. [`fallback`]  — walks an ordered endpoint list on server-class failures
//! 5. [`payload`]   — request/response bodies and base64 helpers
//! 6. [`recorder`]  — best-effort download history with its own retry loop

pub mod executor;
pub mod fallback;
pub mod payload;
pub mod recorder;
pub mod transport;
pub mod validate;
