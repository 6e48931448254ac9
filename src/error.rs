//! Error types for the edgequake-docsum library.
//!
//! Two error types reflect two very different failure modes:
//!
//! * [`DigestError`] — **Fatal**: the analysis cannot produce a response
//!   (unsupported upload, unreadable document, provider failure). Returned as
//!   `Err(DigestError)` from the `analyze*` functions and turned into the
//!   terminal `error` event by the stream.
//!
//! * [`ShapeError`] — **Recoverable**: the model answered with valid JSON
//!   that does not have the requested shape. It never leaves the engine; the
//!   engine falls back to locally derived bullets or placeholder padding.
//!
//! A page-level provider error is fatal for the whole request. The engine
//! does not isolate failures per page.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docsum library.
#[derive(Debug, Error)]
pub enum DigestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload carried no file name, so the format cannot be determined.
    #[error("Uploaded file has no name; cannot determine its format")]
    EmptyFilename,

    /// The file extension is not one of the supported document formats.
    #[error("Unsupported file type '{extension}'\nSupported: .pdf .docx .pptx .txt .md")]
    UnsupportedFileType { extension: String },

    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The upload exceeds the configured size limit.
    #[error("Upload too large: {size} bytes (limit {limit} bytes)")]
    UploadTooLarge { size: u64, limit: u64 },

    /// No page yielded any text.
    #[error("No text could be extracted from the document.\nScanned or image-only documents require OCR, which is not supported.")]
    EmptyDocument,

    /// The container or markup of the document is corrupt.
    #[error("Failed to parse '{path}': {detail}")]
    DocumentParseFailed { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// No backend could be built (missing API key, unknown provider).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned a non-success response.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// LLM API returned HTTP 429. Not retried.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// LLM API returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// LLM call exceeded the configured timeout.
    #[error("LLM call timed out after {elapsed_ms}ms")]
    ApiTimeout { elapsed_ms: u64 },

    /// The model replied with content that is not a JSON object.
    #[error("LLM returned malformed JSON: {detail}")]
    MalformedResponse { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigestError {
    /// True for errors caused by the submitted document rather than the
    /// provider or the library. These are surfaced before the background
    /// pipeline starts whenever possible.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DigestError::EmptyFilename
                | DigestError::UnsupportedFileType { .. }
                | DigestError::FileNotFound { .. }
                | DigestError::PermissionDenied { .. }
                | DigestError::UploadTooLarge { .. }
                | DigestError::EmptyDocument
                | DigestError::DocumentParseFailed { .. }
        )
    }
}

/// Valid JSON from the model that does not match the requested schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// A required top-level key is absent.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A key is present with the wrong JSON type.
    #[error("field '{field}' should be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}
