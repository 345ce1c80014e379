//! Error types for the eventdoc-extract library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`ExtractError`] is **fatal**: the request cannot proceed at all
//!   (undecodable image, unsupported document type, generation backend timed
//!   out). Returned as `Err(ExtractError)` from the top-level entry points and
//!   surfaced as a terminal `error` progress event in streaming mode.
//!
//! * [`RecognitionError`] is **non-fatal**: one OCR call (one preprocessing
//!   variant under one page-segmentation mode) failed. The ensemble engine
//!   treats it as a blank candidate and keeps going.
//!
//! * [`BackendError`] is raised by a [`crate::pipeline::llm::CompletionBackend`]
//!   and mapped onto the transport variants of [`ExtractError`].
//!
//! Malformed JSON and missing fields are not errors at all: the repair
//! cascade and the field extractor absorb them into fallback values.

use std::path::PathBuf;
use thiserror::Error;

/// Where a fatal error sits in the failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected during validation, before any extraction work.
    FatalInput,
    /// The generation backend timed out or returned a non-success.
    Transport,
    /// Configuration or template profile is invalid.
    Config,
    /// Unexpected internal failure (task panic, runtime creation).
    Internal,
}

/// All fatal errors returned by the eventdoc-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes are neither an image, a PDF, nor UTF-8 text.
    #[error("Unsupported input: {detail}")]
    UnsupportedInput { detail: String },

    /// The bytes have a recognised format but their structure is broken.
    #[error("Input is malformed: {detail}")]
    InputInvalid { detail: String },

    /// The bytes look like an image but could not be decoded.
    #[error("Image could not be decoded: {detail}")]
    ImageDecode { detail: String },

    /// The decoded image has a zero dimension.
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// The requested document type has no template in the active profile.
    #[error("Unsupported document type: {document_type}")]
    UnsupportedDocumentType { document_type: String },

    /// The generation request lacks fields the template requires.
    #[error("Missing required fields: {}", fields.join(", "))]
    MissingFields { fields: Vec<String> },

    /// A poster was submitted but no text recogniser is configured.
    #[error(
        "No text recogniser is configured for poster extraction.\n\
Build with `--features tesseract` or supply a TextRecognizer."
    )]
    RecognizerUnavailable,

    // ── Transport errors ──────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The generation backend did not answer within the timeout.
    #[error("Request to the generation backend timed out after {secs}s")]
    GenerationTimeout { secs: u64 },

    /// The generation backend returned an error or an empty completion.
    #[error("Generation backend error: {message}")]
    GenerationFailed { message: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A template profile failed to load or validate.
    #[error("Invalid template profile: {0}")]
    InvalidProfile(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Classify this error into the failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::FileNotFound { .. }
            | ExtractError::PermissionDenied { .. }
            | ExtractError::DownloadFailed { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::UnsupportedInput { .. }
            | ExtractError::InputInvalid { .. }
            | ExtractError::ImageDecode { .. }
            | ExtractError::EmptyImage { .. }
            | ExtractError::UnsupportedDocumentType { .. }
            | ExtractError::MissingFields { .. }
            | ExtractError::RecognizerUnavailable => ErrorKind::FatalInput,
            ExtractError::ProviderNotConfigured { .. }
            | ExtractError::GenerationTimeout { .. }
            | ExtractError::GenerationFailed { .. } => ErrorKind::Transport,
            ExtractError::InvalidConfig(_) | ExtractError::InvalidProfile(_) => ErrorKind::Config,
            ExtractError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<BackendError> for ExtractError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Timeout { secs } => ExtractError::GenerationTimeout { secs },
            BackendError::Api { message } => ExtractError::GenerationFailed { message },
        }
    }
}

/// A non-fatal failure of a single recognition call.
#[derive(Debug, Clone, Error)]
pub enum RecognitionError {
    /// The engine could not be initialised for this call.
    #[error("recogniser init failed: {0}")]
    Init(String),

    /// The band image could not be handed to the engine.
    #[error("image hand-off failed: {0}")]
    Image(String),

    /// The engine ran but produced no usable output.
    #[error("recognition failed: {0}")]
    Engine(String),
}

/// Failure reported by a completion backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{message}")]
    Api { message: String },
}
