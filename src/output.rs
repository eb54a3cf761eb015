//! Output types returned by the generation pipeline.

use crate::config::OutputFormat;
use crate::pipeline::recorder::RecordingHandle;
use serde::Serialize;
use std::fmt;

/// Where the artifact bytes live.
#[derive(Clone, PartialEq, Eq)]
pub enum ArtifactPayload {
    /// Decoded file contents.
    Inline(Vec<u8>),
    /// The backend stored the file and returned a download link.
    Remote(String),
}

impl fmt::Debug for ArtifactPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactPayload::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            ArtifactPayload::Remote(url) => f.debug_tuple("Remote").field(url).finish(),
        }
    }
}

/// A generated document file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub format: OutputFormat,
    pub payload: ArtifactPayload,
    /// Size in bytes, as reported by the backend or measured locally.
    pub file_size: u64,
    pub mime_type: &'static str,
}

impl Artifact {
    pub fn inline(format: OutputFormat, bytes: Vec<u8>) -> Self {
        Self {
            format,
            file_size: bytes.len() as u64,
            payload: ArtifactPayload::Inline(bytes),
            mime_type: format.mime_type(),
        }
    }

    pub fn remote(format: OutputFormat, url: String, file_size: u64) -> Self {
        Self {
            format,
            payload: ArtifactPayload::Remote(url),
            file_size,
            mime_type: format.mime_type(),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            ArtifactPayload::Inline(b) => Some(b),
            ArtifactPayload::Remote(_) => None,
        }
    }

    pub fn download_url(&self) -> Option<&str> {
        match &self.payload {
            ArtifactPayload::Remote(u) => Some(u),
            ArtifactPayload::Inline(_) => None,
        }
    }

    /// `paper.docx` / `paper.pdf` from a title.
    pub fn suggested_file_name(&self, title: &str) -> String {
        let stem: String = title
            .trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let stem = stem.trim_matches('_');
        let stem = if stem.is_empty() { "document" } else { stem };
        format!("{}.{}", stem, self.format.as_str())
    }
}

/// Summary of one `generate` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    /// Endpoints abandoned for a fallback candidate.
    pub fallbacks: u32,
    /// Whether the conversion stage ran.
    pub converted: bool,
    /// Sanitize repaired the document before sending.
    pub sanitized: bool,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

/// Result of a successful `generate` call.
#[derive(Debug)]
pub struct GenerationOutput {
    pub artifact: Artifact,
    pub stats: GenerationStats,
    /// Detached download recording, present only for downloads with a
    /// configured history endpoint.
    pub recording: Option<RecordingHandle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_artifact_measures_size() {
        let a = Artifact::inline(OutputFormat::Pdf, b"%PDF-1.7".to_vec());
        assert_eq!(a.file_size, 8);
        assert_eq!(a.mime_type, "application/pdf");
        assert_eq!(a.bytes(), Some(&b"%PDF-1.7"[..]));
        assert_eq!(a.download_url(), None);
    }

    #[test]
    fn file_name_from_title() {
        let a = Artifact::remote(OutputFormat::Docx, "https://x/y".into(), 10);
        assert_eq!(a.suggested_file_name("Deep Nets: A Survey"), "Deep_Nets__A_Survey.docx");
        assert_eq!(a.suggested_file_name("  "), "document.docx");
    }
}
