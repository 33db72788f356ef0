//! Document text extraction
//!
//! Uploaded PDF and DOCX files are converted to text by the backend. The
//! backend answers in several shapes depending on the document type, so
//! [`normalize_extraction`] folds them into a single string. The proxy route
//! in [`crate::server`] applies it server side; [`DocumentExtractor`] is the
//! client of that route and additionally collapses whitespace so the result
//! can be used as a knowledge base.

use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SessionError};

/// Path of the extraction proxy route
pub const PROCESS_DOCUMENT_PATH: &str = "/api/process-document";

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Backend endpoint that converts this format
    pub fn upstream_path(&self) -> &'static str {
        match self {
            Self::Pdf => "/api/get-pdf-content",
            Self::Docx => "/api/get-docx-content",
        }
    }

    /// Multipart field name the backend expects the file under
    pub fn upstream_field(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }

    /// Guesses the kind from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl FromStr for DocumentKind {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(SessionError::DocumentProcessing {
                status: 400,
                details: format!("Unsupported document type: {}", other),
            }),
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// JSON truthiness: null, false, 0 and "" don't count as content
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Extracts the document text from an upstream response body
///
/// DOCX conversions answer `{"status": 200, "data": ...}`. Other shapes are
/// tried in order: a bare string, then `content`, `text` and `data` fields.
/// Returns `None` for anything else.
///
/// # Examples
///
/// ```
/// use aihuman::documents::{normalize_extraction, DocumentKind};
/// use serde_json::json;
///
/// let docx = json!({"status": 200, "data": "hello"});
/// assert_eq!(normalize_extraction(DocumentKind::Docx, &docx).as_deref(), Some("hello"));
///
/// let pdf = json!("hello");
/// assert_eq!(normalize_extraction(DocumentKind::Pdf, &pdf).as_deref(), Some("hello"));
///
/// assert_eq!(normalize_extraction(DocumentKind::Pdf, &json!({"pages": 3})), None);
/// ```
pub fn normalize_extraction(kind: DocumentKind, body: &Value) -> Option<String> {
    if kind == DocumentKind::Docx {
        let status_ok = body.get("status").and_then(Value::as_u64) == Some(200);
        if let (true, Some(data)) = (status_ok, body.get("data")) {
            if truthy(data) {
                return Some(as_content(data));
            }
        }
    }

    if let Value::String(text) = body {
        return Some(text.clone());
    }

    ["content", "text", "data"]
        .iter()
        .filter_map(|field| body.get(field))
        .find(|value| truthy(value))
        .map(as_content)
}

/// Collapses whitespace runs to one space and trims
///
/// # Examples
///
/// ```
/// use aihuman::documents::clean_extracted_text;
///
/// assert_eq!(clean_extracted_text("  Chapter 1\n\n  Intro\t text "), "Chapter 1 Intro text");
/// ```
pub fn clean_extracted_text(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    whitespace.replace_all(text, " ").trim().to_string()
}

/// Successful proxy reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub content: String,
}

/// Proxy error reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ExtractionFailure {
    fn describe(&self) -> String {
        match &self.details {
            Some(Value::String(details)) => format!("{}: {}", self.error, details),
            Some(details) => format!("{}: {}", self.error, details),
            None => self.error.clone(),
        }
    }
}

/// Client of the extraction proxy route
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    client: Client,
    endpoint: String,
    bearer: String,
}

impl DocumentExtractor {
    /// Creates an extractor for the proxy hosted at `base_url`
    pub fn new(base_url: &str, bearer: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("aihuman/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), PROCESS_DOCUMENT_PATH),
            bearer: bearer.into(),
        })
    }

    /// Uploads `bytes` as a document of `kind` and returns its cleaned text
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DocumentProcessing`] with the proxy status
    /// when extraction fails.
    pub async fn extract(&self, kind: DocumentKind, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(kind.mime_type())?;
        let form = Form::new()
            .part("file", part)
            .text("type", kind.as_str());

        tracing::debug!(kind = %kind, file = %file_name, "Extracting document text");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.bearer)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let details = serde_json::from_str::<ExtractionFailure>(&body)
                .map(|failure| failure.describe())
                .unwrap_or(body);
            tracing::warn!(%status, %details, "Document extraction failed");
            return Err(SessionError::DocumentProcessing {
                status: status.as_u16(),
                details,
            }
            .into());
        }

        let document: ExtractedDocument = serde_json::from_str(&body).map_err(|e| {
            SessionError::DocumentProcessing {
                status: status.as_u16(),
                details: format!("Unexpected response: {}", e),
            }
        })?;
        Ok(clean_extracted_text(&document.content))
    }

    /// Reads `path` and extracts it, inferring the kind from the extension
    pub async fn extract_file(&self, path: &Path) -> Result<String> {
        let kind = DocumentKind::from_path(path).ok_or_else(|| SessionError::DocumentProcessing {
            status: 400,
            details: format!("Cannot infer document type of {}", path.display()),
        })?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document")
            .to_string();
        self.extract(kind, &file_name, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_docx_status_envelope() {
        let body = json!({"status": 200, "data": "hello"});
        assert_eq!(
            normalize_extraction(DocumentKind::Docx, &body).as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_docx_falls_back_to_generic_shapes() {
        let body = json!({"content": "from content"});
        assert_eq!(
            normalize_extraction(DocumentKind::Docx, &body).as_deref(),
            Some("from content")
        );
    }

    #[test]
    fn test_docx_with_failed_status_is_not_data() {
        let body = json!({"status": 500, "message": "boom"});
        assert_eq!(normalize_extraction(DocumentKind::Docx, &body), None);
    }

    #[test]
    fn test_pdf_field_precedence() {
        let body = json!({"text": "second", "content": "first", "data": "third"});
        assert_eq!(
            normalize_extraction(DocumentKind::Pdf, &body).as_deref(),
            Some("first")
        );

        let body = json!({"content": "", "text": "second"});
        assert_eq!(
            normalize_extraction(DocumentKind::Pdf, &body).as_deref(),
            Some("second")
        );
    }

    #[test]
    fn test_pdf_bare_string() {
        assert_eq!(
            normalize_extraction(DocumentKind::Pdf, &json!("hello")).as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn test_unrecognized_shape() {
        assert_eq!(normalize_extraction(DocumentKind::Pdf, &json!({"pages": 2})), None);
        assert_eq!(normalize_extraction(DocumentKind::Pdf, &json!(null)), None);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("PDF".parse::<DocumentKind>().unwrap(), DocumentKind::Pdf);
        assert_eq!(
            DocumentKind::from_path(Path::new("notes/plan.docx")),
            Some(DocumentKind::Docx)
        );
        assert_eq!(DocumentKind::from_path(Path::new("notes.txt")), None);
        assert!("txt".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_clean_extracted_text() {
        assert_eq!(clean_extracted_text("\n\n"), "");
        assert_eq!(clean_extracted_text("a  b\r\nc"), "a b c");
    }
}
