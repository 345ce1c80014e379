//! Integration tests for eventdoc-extract.
//!
//! Everything runs in-process: the text recogniser and the generation
//! backend are fakes, so no OCR engine, network or API key is needed.
//!
//! Run with:
//!   cargo test --test pipeline

use eventdoc_extract::model::{BandName, BandTexts};
use eventdoc_extract::pipeline::dedup::clean_title;
use eventdoc_extract::pipeline::fields::{extract_fields, parse_date, FieldSource};
use eventdoc_extract::pipeline::repair::{parse_direct, repair_json};
use eventdoc_extract::profile::BandSpec;
use eventdoc_extract::progress::ProgressLog;
use eventdoc_extract::{
    extract_stream, repair_sections, BackendError, CompletionBackend, ConnectionRegistry, ErrorKind,
    ExtractError, ExtractionConfig, ExtractionRequest, ExtractionStream, Extractor, GenerationRequest,
    PageSegMode, ProgressEvent, ProgressStatus, RecognitionError, RepairStage, RunMode, TemplateProfile,
    TextRecognizer,
};
use futures::future::BoxFuture;
use futures::StreamExt;
use image::{DynamicImage, GrayImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Answers with a fixed text per band, identified by the band's pixel height.
struct PosterReader {
    by_height: HashMap<u32, &'static str>,
}

impl TextRecognizer for PosterReader {
    fn recognize(&self, image: &GrayImage, _: PageSegMode, _: &str) -> Result<String, RecognitionError> {
        self.by_height
            .get(&image.height())
            .map(|t| t.to_string())
            .ok_or_else(|| RecognitionError::Engine(format!("no text at height {}", image.height())))
    }
}

/// Blocks every call until the gate opens; counts calls.
struct Gated {
    gate: Arc<(Mutex<bool>, Condvar)>,
    calls: AtomicUsize,
}

impl TextRecognizer for Gated {
    fn recognize(&self, _: &GrayImage, _: PageSegMode, _: &str) -> Result<String, RecognitionError> {
        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("SOME TEXT".into())
    }
}

struct Fixed(String);

impl CompletionBackend for Fixed {
    fn complete<'a>(&'a self, _: &'a str, _: &'a str) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

struct Hanging;

impl CompletionBackend for Hanging {
    fn complete<'a>(&'a self, _: &'a str, _: &'a str) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Bands with pairwise distinct pixel heights on a 1000-row image, all tall
/// enough to skip upscaling.
fn distinct_band_profile() -> TemplateProfile {
    let spec = |name, start, end, psm| BandSpec {
        name,
        start,
        end,
        psm,
    };
    TemplateProfile {
        bands: vec![
            spec(BandName::Header, 0.00, 0.20, PageSegMode::SingleBlock),
            spec(BandName::Department, 0.20, 0.35, PageSegMode::SingleBlock),
            spec(BandName::Title, 0.35, 0.56, PageSegMode::Auto),
            spec(BandName::Speaker, 0.56, 0.75, PageSegMode::SingleColumn),
            spec(BandName::Coordinator, 0.75, 0.86, PageSegMode::SingleBlock),
            spec(BandName::Footer, 0.86, 1.00, PageSegMode::SparseText),
        ],
        ..TemplateProfile::default()
    }
}

fn poster_reader() -> PosterReader {
    let by_height = HashMap::from([
        (200, "ABC COLLEGE OF ENGINEERING\nAUTONOMOUS"),
        (150, "DEPARTMENTOF COMPUTER SCIENCE ENGINEERING"),
        (210, "AI WORKSHOP\nAI WORKSHOP ON ROBOTICS"),
        (190, "GUEST SPEAKER\nDR. JOHN DOE\nSENIOR SCIENTIST\nISRO BANGALORE"),
        (110, "CO-ORDINATOR\nMS. JANE ROE\n12.03.2024"),
        (140, "PRINCIPAL"),
    ]);
    PosterReader { by_height }
}

fn poster_extractor() -> Extractor {
    let config = ExtractionConfig::builder()
        .profile(distinct_band_profile())
        .build()
        .unwrap();
    Extractor::new(config).with_recognizer(Arc::new(poster_reader()))
}

/// A one-page PDF with an intact xref whose content selects a font the page
/// never declares.
fn fontless_pdf() -> Vec<u8> {
    let content = "BT /F1 12 Tf 20 100 Td (Guest Lecture) Tj ET";
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 200] /Contents 4 0 R >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
    ];
    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", objects.len() + 1, xref).as_bytes(),
    );
    pdf
}

fn guest_lecture() -> GenerationRequest {
    GenerationRequest::new("GuestLecture")
        .field("Guest Name", "Dr. John Doe")
        .field("Guest Designation", "Senior Scientist")
        .field("Event Date", "12-03-2024")
        .field("Activity Code", "GL24")
        .field("Year", "2024")
        .field("No Of Count", "85")
        .field("Organizer Department", "COMPUTER SCIENCE ENGINEERING")
        .field("Organizer Faculty Name", "Ms. Jane Roe")
        .field("Topic", "AI Workshop on Robotics")
}

fn statuses(events: &[ProgressEvent]) -> Vec<ProgressStatus> {
    events.iter().map(|e| e.status).collect()
}

// ── Poster path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn poster_one_shot_fills_every_field() {
    let image = DynamicImage::new_rgb8(300, 1000);
    let output = poster_extractor()
        .extract(ExtractionRequest::PosterImage(image))
        .await
        .expect("poster extraction should succeed");

    let r = output.result.fields().expect("fields result");
    assert_eq!(r.organizer_department, "COMPUTER SCIENCE ENGINEERING");
    assert_eq!(r.guest_name, "DR. JOHN DOE");
    assert_eq!(r.guest_designation, "SENIOR SCIENTIST, ISRO BANGALORE");
    assert_eq!(r.event_date, "12-03-2024");
    assert_eq!(r.year, "2024");
    assert_eq!(r.activity_code, "GL24");
    assert_eq!(r.organizer_faculty_name, "MS. JANE ROE");
    assert_eq!(r.topic, "AI WORKSHOP ON ROBOTICS");

    let messages: Vec<&str> = output.events.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.starts_with("Segmented image into 6 bands")));
    assert!(messages.iter().any(|m| m.starts_with("Recognising footer band (6/6)")));
    let n = messages.len();
    assert_eq!(&messages[n - 3..n - 1], &["Cleaning up title", "Title cleaned up"]);
    assert_eq!(output.events[n - 2].data.as_ref().unwrap()["topic"], "AI WORKSHOP ON ROBOTICS");
    assert_eq!(*statuses(&output.events).last().unwrap(), ProgressStatus::Complete);
}

#[tokio::test]
async fn poster_stream_emits_terminal_event_last() {
    let registry = Arc::new(ConnectionRegistry::new());
    let image = DynamicImage::new_rgb8(300, 1000);
    let stream = extract_stream(&poster_extractor(), ExtractionRequest::PosterImage(image), &registry);

    let events: Vec<ProgressEvent> = stream.events.collect().await;
    stream.task.await.unwrap();

    let s = statuses(&events);
    assert_eq!(s.iter().filter(|st| st.is_terminal()).count(), 1);
    assert_eq!(*s.last().unwrap(), ProgressStatus::Complete);
    let data = events.last().unwrap().data.as_ref().unwrap();
    assert_eq!(data["fields"]["Guest Name"], "DR. JOHN DOE");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn undecodable_poster_is_rejected_before_processing() {
    let mut log = ProgressLog::default();
    let ex = poster_extractor();
    let err = ex
        .run(ExtractionRequest::Poster(b"\x89PNG\r\n\x1a\nbroken".to_vec()), &mut log, RunMode::OneShot)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::ImageDecode { .. }), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::FatalInput);
    assert_eq!(statuses(log.events()), vec![ProgressStatus::Processing, ProgressStatus::Error]);
}

#[tokio::test]
async fn hand_built_config_is_rejected_before_processing() {
    let config = ExtractionConfig {
        profile: distinct_band_profile(),
        top_candidates: 0,
        combined_candidates: 0,
        ..ExtractionConfig::default()
    };
    let ex = Extractor::new(config).with_recognizer(Arc::new(poster_reader()));
    let mut log = ProgressLog::default();
    let err = ex
        .run(
            ExtractionRequest::PosterImage(DynamicImage::new_rgb8(300, 1000)),
            &mut log,
            RunMode::OneShot,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::InvalidConfig(_)), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(statuses(log.events()), vec![ProgressStatus::Processing, ProgressStatus::Error]);
    assert_eq!(log.events().last().unwrap().data.as_ref().unwrap()["kind"], "Config");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_halts_at_band_boundary_and_releases_consumer() {
    let gate = Arc::new((Mutex::new(false), Condvar::new()));
    let recognizer = Arc::new(Gated {
        gate: Arc::clone(&gate),
        calls: AtomicUsize::new(0),
    });
    let config = ExtractionConfig::builder()
        .profile(distinct_band_profile())
        .build()
        .unwrap();
    let extractor = Extractor::new(config).with_recognizer(recognizer.clone());
    let registry = Arc::new(ConnectionRegistry::new());

    let ExtractionStream { id, mut events, task } = extract_stream(
        &extractor,
        ExtractionRequest::PosterImage(DynamicImage::new_rgb8(300, 1000)),
        &registry,
    );
    while let Some(event) = events.next().await {
        if event.message.starts_with("Recognising header band") {
            break;
        }
    }
    drop(events);
    {
        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    task.await.expect("orchestrator task must not panic");
    assert!(!registry.is_registered(id));
    assert!(registry.is_empty());
    // Header band: primary mode plus two distinct alternates, 8 variants each.
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 3 * 8);
}

// ── Document path ────────────────────────────────────────────────────────────

#[tokio::test]
async fn unreadable_pdf_is_a_terminal_input_error() {
    let err = Extractor::new(ExtractionConfig::default())
        .extract(ExtractionRequest::Document(fontless_pdf()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::InputInvalid { .. }), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::FatalInput);
}

#[tokio::test]
async fn unreadable_pdf_stream_closes_with_error() {
    let registry = Arc::new(ConnectionRegistry::new());
    let extractor = Extractor::new(ExtractionConfig::default());
    let stream = extract_stream(&extractor, ExtractionRequest::Document(fontless_pdf()), &registry);

    let events: Vec<ProgressEvent> = stream.events.collect().await;
    stream.task.await.expect("orchestrator task must not panic");

    assert_eq!(statuses(&events), vec![ProgressStatus::Processing, ProgressStatus::Error]);
    let last = events.last().unwrap();
    assert!(last.message.starts_with("Input is malformed"), "got: {}", last.message);
    assert_eq!(last.data.as_ref().unwrap()["kind"], "FatalInput");
    assert!(registry.is_empty());
}

#[tokio::test]
async fn labelled_document_prefers_labels() {
    let text = "Guest Name: Dr. Meera Nair\nDesignation: Director, Space Lab\nTopic: Satellite Imaging\n\
Date: 7/8/24\nDEPARTMENT OF\nECE\nPRINCIPAL";
    let output = Extractor::new(ExtractionConfig::default())
        .extract(ExtractionRequest::Document(text.as_bytes().to_vec()))
        .await
        .unwrap();
    let r = output.result.fields().unwrap();
    assert_eq!(r.guest_name, "Dr. Meera Nair");
    assert_eq!(r.topic, "Satellite Imaging");
    assert_eq!(r.event_date, "7-8-2024");
    assert_eq!(r.year, "2024");
    assert_eq!(r.activity_code, "GL24");
    assert_eq!(r.organizer_department, "ELECTRONICS AND COMMUNICATION ENGINEERING");
}

// ── Generation path ──────────────────────────────────────────────────────────

#[tokio::test]
async fn fenced_completion_is_repaired() {
    let raw = "```json\n{\"sections\": {\"Event Summary\": \"The lecture was held.\", \"Acknowledgments\": \"Thanks.\",}}\n```";
    let output = Extractor::new(ExtractionConfig::default())
        .with_backend(Arc::new(Fixed(raw.to_string())))
        .extract(ExtractionRequest::Generate(guest_lecture()))
        .await
        .unwrap();
    let doc = output.result.document().unwrap();
    assert_eq!(doc.sections.get("Event Summary"), Some("The lecture was held."));
    assert_eq!(doc.metadata["repair_stage"], "repaired");
    assert_eq!(doc.metadata["document_type"], "GuestLecture");
    assert!(!statuses(&output.events).contains(&ProgressStatus::Warning));
}

#[tokio::test(start_paused = true)]
async fn backend_timeout_is_a_terminal_transport_error() {
    let config = ExtractionConfig::builder().generation_timeout_secs(5).build().unwrap();
    let ex = Extractor::new(config).with_backend(Arc::new(Hanging));
    let mut log = ProgressLog::default();
    let err = ex
        .run(ExtractionRequest::Generate(guest_lecture()), &mut log, RunMode::OneShot)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::GenerationTimeout { secs: 5 }));
    assert_eq!(err.kind(), ErrorKind::Transport);
    let last = log.events().last().unwrap();
    assert_eq!(last.status, ProgressStatus::Error);
    assert!(last.message.contains("timed out"));
}

#[test]
fn blank_required_field_rejected_before_backend_call() {
    let request = guest_lecture().field("No Of Count", "  ");
    let ex = Extractor::new(ExtractionConfig::default()).with_backend(Arc::new(Hanging));
    let err = tokio_test::block_on(ex.extract(ExtractionRequest::Generate(request))).unwrap_err();
    match err {
        ExtractError::MissingFields { fields } => assert_eq!(fields, vec!["No Of Count".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
}

// ── Component properties ─────────────────────────────────────────────────────

#[test]
fn repair_cascade_always_returns_sections() {
    let titles = TemplateProfile::default().mining_titles();
    let inputs = [
        "",
        "   ",
        "null",
        "[]",
        "{",
        "}}}{{{",
        "{\"sections\": []}",
        "{\"sections\": {\"A\": \"x\"",
        "{'sections': {'A': 'single quoted'}}",
        "Sure! Here is your report:",
        "\"Event Summary\": \"It happened.\" and then nothing",
        "\u{0}\u{1}binary\u{7f}",
    ];
    for raw in inputs {
        let out = repair_sections(raw, &titles, 1000);
        assert!(!out.sections.is_empty(), "no sections for {raw:?}");
    }
}

#[test]
fn direct_parse_is_idempotent() {
    let titles = TemplateProfile::default().mining_titles();
    let first = repair_sections(r#"{"sections": {"A": "x", "B": "y \"quoted\""}}"#, &titles, 1000);
    assert_eq!(first.stage, RepairStage::Direct);
    let second = repair_sections(&first.sections.to_json(), &titles, 1000);
    assert_eq!(second.stage, RepairStage::Direct);
    assert_eq!(first.sections, second.sections);
}

#[test]
fn well_formed_input_same_through_either_stage() {
    let raw = r#"{"sections": {"A":"x"}}"#;
    assert_eq!(parse_direct(raw).unwrap(), parse_direct(&repair_json(raw)).unwrap());
}

#[test]
fn field_properties() {
    let d = parse_date("5-6-23").unwrap();
    assert_eq!((d.date.as_str(), d.year.as_str()), ("5-6-2023", "2023"));

    let profile = TemplateProfile::default();
    let r = extract_fields(FieldSource::Flat("Hosted by CSE"), &profile, None).unwrap();
    assert_eq!(r.organizer_department, "COMPUTER SCIENCE ENGINEERING");

    let mut texts = BandTexts::new();
    texts.insert(BandName::Speaker, "DR. JOHN SMITH\nPROFESSOR, XYZ UNIVERSITY");
    let r = extract_fields(FieldSource::Bands(&texts), &profile, None).unwrap();
    assert_eq!(r.guest_name, "DR. JOHN SMITH");
    assert_eq!(r.guest_designation, "PROFESSOR, XYZ UNIVERSITY");

    assert_eq!(
        clean_title("AI WORKSHOP AI WORKSHOP ON ROBOTICS", &profile.admin_role_keywords),
        "AI WORKSHOP ON ROBOTICS"
    );
}
