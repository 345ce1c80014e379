//! Request orchestration: validation, stage sequencing and progress events.
//!
//! Every request walks the same state machine:
//!
//! ```text
//! Idle ──▶ Validating ──▶ Processing ──▶ Complete
//!               │              │
//!               └──────────────┴──────▶ Error
//! ```
//!
//! `Validating` rejects an invalid configuration, undecodable, malformed or
//! unsupported input, unknown document types and missing generation fields
//! before any OCR or backend work starts.
//! `Processing` always ends in `Complete` or `Error`; the matching terminal
//! event is the last one handed to the sink.
//!
//! ## Paths
//!
//! | Request            | Stages |
//! |--------------------|--------|
//! | poster image       | segmentation, OCR per band, field extraction, title cleanup |
//! | flat document      | field extraction, title cleanup |
//! | generation         | backend call, repair cascade |
//!
//! ## Disconnects
//!
//! A sink whose consumer went away is checked at every stage boundary and
//! before every band. Processing halts there and the run reports
//! [`RunOutcome::Abandoned`]; a disconnect is never an error. The work of the
//! stage in flight is not interrupted.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::model::{
    BandName, BandResult, BandTexts, ExtractionResult, FieldRecord, GeneratedDocument, PageSegMode,
    RawSource, RegionSet,
};
use crate::pipeline::fields::{clean_topic, FieldExtractor, FieldSource};
use crate::pipeline::llm::{complete_with_timeout, CompletionBackend, LlmBackend};
use crate::pipeline::ocr::{self, EnsembleOptions, TextRecognizer};
use crate::pipeline::{input, preprocess, repair, segment};
use crate::profile::TemplateProfile;
use crate::progress::{now_millis, ProgressEvent, ProgressLog, ProgressSink};
use crate::prompts;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Longest `parsing_error` kept in document metadata.
const PARSING_ERROR_MAX_CHARS: usize = 500;

// ── Requests ─────────────────────────────────────────────────────────────

/// Ask the generation backend for a report of one document type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub document_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl GenerationRequest {
    pub fn new(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Seed the request from an extracted record.
    pub fn with_record(mut self, record: &FieldRecord) -> Self {
        for (key, value) in record.entries() {
            if !value.is_empty() {
                self.fields.insert(key.to_string(), value.to_string());
            }
        }
        self
    }
}

/// One unit of work for the [`Extractor`].
#[derive(Debug, Clone)]
pub enum ExtractionRequest {
    /// Encoded poster image (PNG or JPEG).
    Poster(Vec<u8>),
    /// Already-decoded poster image.
    PosterImage(DynamicImage),
    /// Document bytes: a PDF or UTF-8 text.
    Document(Vec<u8>),
    /// Document text already in memory.
    Text(String),
    Generate(GenerationRequest),
}

impl ExtractionRequest {
    fn describe(&self) -> &'static str {
        match self {
            ExtractionRequest::Poster(_) | ExtractionRequest::PosterImage(_) => "poster",
            ExtractionRequest::Document(_) | ExtractionRequest::Text(_) => "document",
            ExtractionRequest::Generate(_) => "generation",
        }
    }
}

// ── Run state ────────────────────────────────────────────────────────────

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Validating,
    Processing,
    Complete,
    Error,
}

/// Which timeout set a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    OneShot,
    Streaming,
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished(ExtractionResult),
    /// The consumer disconnected; processing stopped at a stage boundary.
    Abandoned,
}

/// Result of a one-shot run: the payload plus every event emitted.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub result: ExtractionResult,
    pub events: Vec<ProgressEvent>,
}

/// Why processing stopped early.
enum Halt {
    Failed(ExtractError),
    Disconnected,
}

impl From<ExtractError> for Halt {
    fn from(e: ExtractError) -> Self {
        Halt::Failed(e)
    }
}

/// What `Validating` hands to `Processing`.
enum Validated {
    Poster(DynamicImage, Arc<dyn TextRecognizer>),
    Document(String),
    Generate {
        request: GenerationRequest,
        backend: Arc<dyn CompletionBackend>,
    },
}

/// Sink wrapper that tracks state and enforces the terminal-event rule.
struct Run<'s> {
    sink: &'s mut dyn ProgressSink,
    state: RunState,
}

impl<'s> Run<'s> {
    fn new(sink: &'s mut dyn ProgressSink) -> Self {
        Self {
            sink,
            state: RunState::Idle,
        }
    }

    fn enter(&mut self, state: RunState) {
        debug!("run state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn emit(&mut self, event: ProgressEvent) {
        if !self.sink.emit(event) {
            debug!("progress event dropped: consumer gone");
        }
    }

    fn processing(&mut self, message: impl Into<String>) {
        self.emit(ProgressEvent::processing(message));
    }

    /// Stage boundary: stop if nobody is listening any more.
    fn checkpoint(&self) -> Result<(), Halt> {
        if self.sink.is_connected() {
            Ok(())
        } else {
            Err(Halt::Disconnected)
        }
    }
}

// ── Extractor ────────────────────────────────────────────────────────────

/// Runs extraction and generation requests.
///
/// Cheap to clone; every request is independent and nothing is cached
/// between runs.
///
/// # Example
/// ```rust,no_run
/// use eventdoc_extract::{ExtractionConfig, ExtractionRequest, Extractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = Extractor::new(ExtractionConfig::default());
/// let text = "GUEST LECTURE\nDEPARTMENT OF CSE\nDR. A. KUMAR\n12-03-2024".to_string();
/// let output = extractor.extract(ExtractionRequest::Text(text)).await?;
/// println!("{:?}", output.result.fields());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Extractor {
    config: ExtractionConfig,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("config", &self.config)
            .field("recognizer", &self.recognizer.is_some())
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

impl Extractor {
    /// An extractor with no recogniser and a lazily resolved LLM backend.
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            recognizer: None,
            backend: None,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    fn profile(&self) -> &TemplateProfile {
        &self.config.profile
    }

    /// One-shot mode: run to completion and return the result with its log.
    ///
    /// # Errors
    /// Fatal-input and transport failures. Malformed completions and missing
    /// fields are not errors; they degrade into fallback values.
    pub async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ExtractError> {
        let mut log = ProgressLog::default();
        match self.run(request, &mut log, RunMode::OneShot).await? {
            RunOutcome::Finished(result) => Ok(ExtractionOutput {
                result,
                events: log.into_events(),
            }),
            RunOutcome::Abandoned => Err(ExtractError::Internal(
                "in-memory progress log reported a disconnect".into(),
            )),
        }
    }

    /// Synchronous wrapper around [`Extractor::extract`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn extract_sync(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ExtractError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.extract(request))
    }

    /// Run one request, reporting progress to `sink`.
    ///
    /// The last event handed to a connected sink is `complete` or `error`.
    pub async fn run(
        &self,
        request: ExtractionRequest,
        sink: &mut dyn ProgressSink,
        mode: RunMode,
    ) -> Result<RunOutcome, ExtractError> {
        let start = Instant::now();
        let kind = request.describe();
        info!("starting {} request ({:?})", kind, mode);
        let mut run = Run::new(sink);

        match self.drive(request, &mut run, mode).await {
            Ok(result) => {
                run.enter(RunState::Complete);
                let data = serde_json::to_value(&result).ok();
                let message = match result {
                    ExtractionResult::Fields(_) => "Extraction complete",
                    ExtractionResult::Document(_) => "Document generated successfully",
                };
                run.emit(ProgressEvent::complete(message, data));
                info!("{} request complete in {:?}", kind, start.elapsed());
                Ok(RunOutcome::Finished(result))
            }
            Err(Halt::Disconnected) => {
                run.enter(RunState::Error);
                run.emit(ProgressEvent::error("Consumer disconnected"));
                info!("{} request abandoned after {:?}: consumer disconnected", kind, start.elapsed());
                Ok(RunOutcome::Abandoned)
            }
            Err(Halt::Failed(e)) => {
                run.enter(RunState::Error);
                warn!("{} request failed ({:?}): {}", kind, e.kind(), e);
                run.emit(
                    ProgressEvent::error(e.to_string())
                        .with_data(serde_json::json!({ "kind": format!("{:?}", e.kind()) })),
                );
                Err(e)
            }
        }
    }

    async fn drive(&self, request: ExtractionRequest, run: &mut Run<'_>, mode: RunMode) -> Result<ExtractionResult, Halt> {
        run.enter(RunState::Validating);
        run.processing("Validating input");
        let validated = self.validate(request).await?;
        run.checkpoint()?;

        run.enter(RunState::Processing);
        match validated {
            Validated::Poster(image, recognizer) => self.poster(image, recognizer, run).await,
            Validated::Document(text) => self.document(text, run).await,
            Validated::Generate { request, backend } => self.generate(request, backend.as_ref(), run, mode).await,
        }
    }

    // ── Validating ───────────────────────────────────────────────────────

    async fn validate(&self, request: ExtractionRequest) -> Result<Validated, ExtractError> {
        self.config.validate()?;
        match request {
            ExtractionRequest::Poster(bytes) => match classify(bytes).await? {
                RawSource::Image(image) => self.validate_poster(image),
                other => Err(ExtractError::UnsupportedInput {
                    detail: format!("expected a poster image, got {}", other.kind()),
                }),
            },
            ExtractionRequest::PosterImage(image) => {
                if image.width() == 0 || image.height() == 0 {
                    return Err(ExtractError::EmptyImage {
                        width: image.width(),
                        height: image.height(),
                    });
                }
                self.validate_poster(image)
            }
            ExtractionRequest::Document(bytes) => match classify(bytes).await? {
                RawSource::Text(text) => Ok(Validated::Document(text)),
                other => Err(ExtractError::UnsupportedInput {
                    detail: format!("expected document text, got {}", other.kind()),
                }),
            },
            ExtractionRequest::Text(text) => Ok(Validated::Document(text)),
            ExtractionRequest::Generate(request) => self.validate_generation(request),
        }
    }

    fn validate_poster(&self, image: DynamicImage) -> Result<Validated, ExtractError> {
        let recognizer = self
            .recognizer
            .clone()
            .ok_or(ExtractError::RecognizerUnavailable)?;
        Ok(Validated::Poster(image, recognizer))
    }

    fn validate_generation(&self, request: GenerationRequest) -> Result<Validated, ExtractError> {
        let template = self.profile().template(&request.document_type).ok_or_else(|| {
            ExtractError::UnsupportedDocumentType {
                document_type: request.document_type.clone(),
            }
        })?;
        let missing: Vec<String> = template
            .required_fields
            .iter()
            .filter(|k| request.fields.get(*k).is_none_or(|v| v.trim().is_empty()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ExtractError::MissingFields { fields: missing });
        }
        let backend = match &self.backend {
            Some(backend) => Arc::clone(backend),
            None => Arc::new(LlmBackend::from_config(&self.config)?),
        };
        Ok(Validated::Generate { request, backend })
    }

    // ── Poster path ──────────────────────────────────────────────────────

    async fn poster(
        &self,
        image: DynamicImage,
        recognizer: Arc<dyn TextRecognizer>,
        run: &mut Run<'_>,
    ) -> Result<ExtractionResult, Halt> {
        run.processing(format!("Segmenting {}x{} image into bands", image.width(), image.height()));
        let regions = segment::segment(&image, self.profile())?;
        drop(image);
        run.processing(format!("Segmented image into {} bands", regions.len()));

        let opts = EnsembleOptions::from(&self.config);
        let results = self.recognize_bands(&regions, &recognizer, &opts, run).await?;
        let texts = BandTexts::from(results.as_slice());
        run.checkpoint()?;

        run.processing("Extracting fields");
        let department_band = regions.get(BandName::Department).map(|b| b.image.clone());
        drop(regions);
        let profile = self.profile().clone();
        let record = blocking(move || {
            let extractor = FieldExtractor::new(&profile)?;
            let fallback = HighlightFallback {
                band: department_band,
                recognizer,
                opts,
            };
            Ok(extractor.extract_raw(FieldSource::Bands(&texts), Some(&fallback)))
        })
        .await?;
        run.processing(format!("Extracted {} of 8 fields", record.filled()));
        run.checkpoint()?;

        Ok(ExtractionResult::Fields(self.cleanup(record, run)))
    }

    async fn recognize_bands(
        &self,
        regions: &RegionSet,
        recognizer: &Arc<dyn TextRecognizer>,
        opts: &EnsembleOptions,
        run: &mut Run<'_>,
    ) -> Result<Vec<BandResult>, Halt> {
        let total = regions.len();
        let mut results = Vec::with_capacity(total);
        for (i, band) in regions.bands.iter().enumerate() {
            run.checkpoint()?;
            run.processing(format!("Recognising {} band ({}/{})", band.name, i + 1, total));

            let recognizer = Arc::clone(recognizer);
            let band = band.clone();
            let opts = opts.clone();
            let result = blocking(move || Ok(ocr::recognize_band(recognizer.as_ref(), &band, &opts))).await?;

            if result.top_candidates.is_empty() {
                run.emit(ProgressEvent::warning(format!("No legible text in {} band", result.band)));
            } else {
                run.emit(
                    ProgressEvent::processing(format!(
                        "Recognised {} band (confidence {:.2})",
                        result.band, result.confidence
                    ))
                    .with_data(serde_json::json!({
                        "band": result.band,
                        "confidence": result.confidence,
                        "text": result.best_text,
                    })),
                );
            }
            results.push(result);
        }
        Ok(results)
    }

    // ── Document path ────────────────────────────────────────────────────

    async fn document(&self, text: String, run: &mut Run<'_>) -> Result<ExtractionResult, Halt> {
        if text.trim().is_empty() {
            run.emit(ProgressEvent::warning("Document contains no text"));
        }
        run.processing("Extracting fields from document text");
        let extractor = FieldExtractor::new(self.profile())?;
        let record = extractor.extract_raw(FieldSource::Flat(&text), None);
        run.processing(format!("Extracted {} of 8 fields", record.filled()));
        run.checkpoint()?;
        Ok(ExtractionResult::Fields(self.cleanup(record, run)))
    }

    fn cleanup(&self, record: FieldRecord, run: &mut Run<'_>) -> FieldRecord {
        run.processing("Cleaning up title");
        let before = record.topic.clone();
        let record = clean_topic(record, self.profile());
        if before != record.topic {
            debug!("title cleaned: {:?} -> {:?}", before, record.topic);
        }
        run.emit(
            ProgressEvent::processing("Title cleaned up")
                .with_data(serde_json::json!({ "topic": record.topic })),
        );
        record
    }

    // ── Generation path ──────────────────────────────────────────────────

    async fn generate(
        &self,
        request: GenerationRequest,
        backend: &dyn CompletionBackend,
        run: &mut Run<'_>,
        mode: RunMode,
    ) -> Result<ExtractionResult, Halt> {
        let profile = self.profile();
        let template = profile.template(&request.document_type).ok_or_else(|| {
            ExtractError::UnsupportedDocumentType {
                document_type: request.document_type.clone(),
            }
        })?;
        let system = prompts::system_prompt(profile);
        let user = prompts::user_prompt(template, &request.fields);

        let secs = self.config.generation_timeout(mode == RunMode::Streaming);
        run.processing(format!("Generating {}", template.label));
        let raw = complete_with_timeout(backend, &system, &user, secs)
            .await
            .map_err(ExtractError::from)?;
        run.checkpoint()?;

        run.processing("Parsing generated content");
        let outcome = repair::repair_sections(&raw, &profile.mining_titles(), self.config.fallback_excerpt_chars);
        debug!("completion parsed at stage {} ({})", outcome.stage.index(), outcome.stage.as_str());
        if outcome.is_fallback() {
            run.emit(ProgressEvent::warning(
                "Generated content could not be parsed; returning raw excerpt",
            ));
        }

        let content = outcome
            .sections
            .iter()
            .map(|(_, body)| body)
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = content.split_whitespace().count();

        let mut metadata = BTreeMap::new();
        metadata.insert("document_type".to_string(), request.document_type.clone());
        metadata.insert("generated_at".to_string(), now_millis().to_string());
        metadata.insert("total_sections".to_string(), outcome.sections.len().to_string());
        metadata.insert("word_count".to_string(), word_count.to_string());
        metadata.insert("repair_stage".to_string(), outcome.stage.as_str().to_string());
        if outcome.is_fallback() {
            if let Some(diagnostic) = outcome.diagnostic() {
                metadata.insert(
                    "parsing_error".to_string(),
                    diagnostic.chars().take(PARSING_ERROR_MAX_CHARS).collect(),
                );
            }
        }

        Ok(ExtractionResult::Document(GeneratedDocument {
            content,
            word_count,
            sections: outcome.sections,
            metadata,
        }))
    }
}

/// Run CPU-bound work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::Internal(format!("worker task failed: {e}")))?
}

/// Classify uploaded bytes off the executor; decoding and PDF parsing are CPU-bound.
async fn classify(bytes: Vec<u8>) -> Result<RawSource, ExtractError> {
    blocking(move || input::classify(&bytes)).await
}

/// Re-reads the saturated ribbon of the department band.
struct HighlightFallback {
    band: Option<RgbImage>,
    recognizer: Arc<dyn TextRecognizer>,
    opts: EnsembleOptions,
}

impl crate::pipeline::fields::DepartmentFallback for HighlightFallback {
    fn recognize_department(&self) -> Option<String> {
        let region = preprocess::highlight_region(self.band.as_ref()?)?;
        let gray = preprocess::to_gray(&region, self.opts.min_band_height);
        let candidates = ocr::recognize_gray(self.recognizer.as_ref(), &gray, PageSegMode::SingleBlock, &self.opts);
        let result = ocr::rank(BandName::Department, candidates, &self.opts);
        (!result.best_text.is_empty()).then_some(result.best_text)
    }
}
