//! # eventdoc-extract
//!
//! Turn unreliable text sources into structured field data for event
//! document templates.
//!
//! Two sources are unreliable in practice: a language-model completion that
//! is *supposed* to be JSON, and a photographed or exported event poster
//! whose OCR output is noisy. This crate turns both into typed records and
//! never gives up on malformed data: the worst case is an empty field or a
//! single fallback section, not an error.
//!
//! ## Pipeline Overview
//!
//! ```text
//! poster image
//!  │
//!  ├─ 1. Validate  classify bytes, decode image
//!  ├─ 2. Segment   six fixed bands (header … footer)
//!  ├─ 3. OCR       8 preprocessing variants × up to 4 segmentation modes per band
//!  ├─ 4. Fields    anchor detection + ordered fallback strategies
//!  └─ 5. Title     repeated-phrase removal
//!
//! generation request
//!  │
//!  ├─ 1. Validate  known document type, all required fields present
//!  ├─ 2. Generate  one timed call through edgequake-llm
//!  └─ 3. Repair    direct parse → syntactic repair → section mining → raw excerpt
//! ```
//!
//! Each request emits an ordered sequence of [`ProgressEvent`]s ending in
//! `complete` or `error`. [`Extractor::extract`] collects them; [`extract_stream`]
//! delivers them to one consumer as they happen.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eventdoc_extract::{ExtractionConfig, ExtractionRequest, Extractor, GenerationRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let extractor = Extractor::new(ExtractionConfig::default());
//!
//!     let text = std::fs::read_to_string("event.txt")?;
//!     let output = extractor.extract(ExtractionRequest::Text(text)).await?;
//!     let record = output.result.fields().cloned().unwrap_or_default();
//!
//!     let request = GenerationRequest::new("GuestLecture")
//!         .with_record(&record)
//!         .field("No Of Count", "120");
//!     let report = extractor.extract(ExtractionRequest::Generate(request)).await?;
//!     println!("{}", report.result.document().map(|d| d.content.as_str()).unwrap_or(""));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature     | Default | Description |
//! |-------------|---------|-------------|
//! | `cli`       | on      | Enables the `eventdoc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `tesseract` | off     | [`pipeline::tesseract::TesseractRecognizer`] via leptess |
//!
//! Without `tesseract`, poster extraction needs a caller-supplied
//! [`TextRecognizer`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{BackendError, ErrorKind, ExtractError, RecognitionError};
pub use extract::{
    ExtractionOutput, ExtractionRequest, Extractor, GenerationRequest, RunMode, RunOutcome, RunState,
};
pub use model::{
    BandName, BandResult, ExtractionResult, Field, FieldRecord, GeneratedDocument, OcrCandidate,
    PageSegMode, RawSource, SectionMapping,
};
pub use pipeline::llm::{CompletionBackend, LlmBackend};
pub use pipeline::ocr::TextRecognizer;
pub use pipeline::repair::{repair_sections, RepairOutcome, RepairStage};
pub use profile::TemplateProfile;
pub use progress::{ProgressEvent, ProgressSink, ProgressStatus};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use stream::{extract_stream, EventStream, ExtractionStream};
