//! Wire shapes exchanged with the generation backend.
//!
//! Binary payloads travel as standard base64 strings inside the JSON bodies;
//! [`encode_bytes`] and [`decode_bytes`] are the only places the crate touches
//! the encoding.

use crate::config::{GenerationMode, OutputFormat, Stage};
use crate::document::Document;
use crate::error::PaperpressError;
use crate::pipeline::transport::HttpResponse;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Conversion identifier understood by the backend.
pub const DOCX_TO_PDF: &str = "docx-to-pdf";

/// `{..document, format, action}` for generation; adds `email` for delivery.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    #[serde(flatten)]
    pub document: &'a Document,
    pub format: &'static str,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<&'a str>,
}

impl<'a> GenerateRequest<'a> {
    pub fn docx(document: &'a Document, mode: GenerationMode) -> Self {
        Self {
            document,
            format: OutputFormat::Docx.as_str(),
            action: mode.as_str(),
            email: None,
        }
    }

    pub fn email(document: &'a Document, recipient: &'a str, format: OutputFormat) -> Self {
        Self {
            document,
            format: format.as_str(),
            action: "email",
            email: Some(recipient),
        }
    }
}

/// `{format: "docx-to-pdf", action, docx_data}`.
#[derive(Debug, Serialize)]
pub struct ConvertRequest {
    pub format: &'static str,
    pub action: &'static str,
    pub docx_data: String,
}

impl ConvertRequest {
    pub fn docx_to_pdf(docx: &[u8], mode: GenerationMode) -> Self {
        Self {
            format: DOCX_TO_PDF,
            action: mode.as_str(),
            docx_data: encode_bytes(docx),
        }
    }
}

/// Body returned by generation, conversion and email endpoints.
///
/// Every field is optional on the wire; which ones are present depends on
/// the endpoint and the `action`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendResponse {
    pub success: Option<bool>,
    pub file_data: Option<String>,
    pub download_url: Option<String>,
    pub file_size: Option<u64>,
    pub file_type: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl BackendResponse {
    /// Parse a 2xx body, rejecting non-JSON and `success: false`.
    pub fn parse(stage: Stage, response: &HttpResponse) -> Result<Self, PaperpressError> {
        let body: BackendResponse =
            response
                .json()
                .map_err(|e| PaperpressError::MalformedResponse {
                    stage,
                    detail: format!("not a JSON object: {e}"),
                })?;
        if body.success == Some(false) {
            let message = body
                .error
                .clone()
                .or_else(|| body.message.clone())
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(PaperpressError::BackendRejected { stage, message });
        }
        Ok(body)
    }

    /// Decoded inline file, if the backend sent one.
    pub fn decode_file(&self, stage: Stage) -> Result<Option<Vec<u8>>, PaperpressError> {
        match self.file_data.as_deref().filter(|d| !d.is_empty()) {
            Some(data) => decode_bytes(data)
                .map(Some)
                .map_err(|e| PaperpressError::MalformedResponse {
                    stage,
                    detail: format!("file_data is not valid base64: {e}"),
                }),
            None => Ok(None),
        }
    }

    /// Non-empty `download_url`.
    pub fn remote_url(&self) -> Option<&str> {
        self.download_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Body returned by the download-history endpoint: `{success, data: {id}}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecordResponse {
    pub success: Option<bool>,
    pub data: Option<RecordData>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordData {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded {} bytes → {} bytes base64", bytes.len(), b64.len());
    b64
}

/// Decode standard base64, tolerating a `data:...;base64,` prefix and
/// embedded whitespace.
pub fn decode_bytes(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let data = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_flattens_document() {
        let doc = Document {
            id: "d1".into(),
            title: "Paper".into(),
            ..Document::default()
        };
        let v = serde_json::to_value(GenerateRequest::docx(&doc, GenerationMode::Preview)).unwrap();
        assert_eq!(v["title"], "Paper");
        assert_eq!(v["format"], "docx");
        assert_eq!(v["action"], "preview");
        assert!(v.get("email").is_none());
        assert!(v["sections"].is_array());
    }

    #[test]
    fn email_request_carries_recipient() {
        let doc = Document::default();
        let v = serde_json::to_value(GenerateRequest::email(&doc, "a@b.org", OutputFormat::Pdf))
            .unwrap();
        assert_eq!(v["action"], "email");
        assert_eq!(v["email"], "a@b.org");
        assert_eq!(v["format"], "pdf");
    }

    #[test]
    fn convert_request_shape() {
        let request = ConvertRequest::docx_to_pdf(b"PK\x03\x04", GenerationMode::Download);
        let v = serde_json::to_value(request).unwrap();
        assert_eq!(v["format"], "docx-to-pdf");
        assert_eq!(v["action"], "download");
        assert_eq!(decode_bytes(v["docx_data"].as_str().unwrap()).unwrap(), b"PK\x03\x04");
    }

    #[test]
    fn success_false_is_rejected_with_backend_message() {
        let r = HttpResponse::new(200, r#"{"success":false,"error":"Title missing"}"#);
        let err = BackendResponse::parse(Stage::Generating, &r).unwrap_err();
        assert!(matches!(
            err,
            PaperpressError::BackendRejected { ref message, .. } if message == "Title missing"
        ));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let r = HttpResponse::new(200, "<html>gateway</html>");
        assert!(matches!(
            BackendResponse::parse(Stage::ConvertingFormat, &r),
            Err(PaperpressError::MalformedResponse { stage: Stage::ConvertingFormat, .. })
        ));
    }

    #[test]
    fn decode_tolerates_data_uri_and_whitespace() {
        let encoded = STANDARD.encode(b"hello world");
        let uri = format!("data:application/pdf;base64,{}\n", encoded);
        assert_eq!(decode_bytes(&uri).unwrap(), b"hello world");
        let r = BackendResponse {
            file_data: Some("!!!".into()),
            ..BackendResponse::default()
        };
        assert!(r.decode_file(Stage::Generating).is_err());
        assert_eq!(BackendResponse::default().decode_file(Stage::Generating).unwrap(), None);
    }

    #[test]
    fn blank_download_url_is_ignored() {
        let r = BackendResponse {
            download_url: Some("  ".into()),
            ..BackendResponse::default()
        };
        assert_eq!(r.remote_url(), None);
    }
}
