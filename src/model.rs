//! Data model shared by every pipeline stage.
//!
//! All of these values live for exactly one request. Nothing here is cached
//! or shared across requests.

use crate::pipeline::preprocess::Variant;
use image::{DynamicImage, RgbImage};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ── Sources ──────────────────────────────────────────────────────────────

/// A validated input. Immutable once captured.
#[derive(Debug, Clone)]
pub enum RawSource {
    /// A decoded poster image.
    Image(DynamicImage),
    /// Flat document text (UTF-8 text or text pulled out of a PDF).
    Text(String),
}

impl RawSource {
    pub fn kind(&self) -> &'static str {
        match self {
            RawSource::Image(_) => "image",
            RawSource::Text(_) => "text",
        }
    }
}

// ── Bands ────────────────────────────────────────────────────────────────

/// The semantic sections of the poster template, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandName {
    Header,
    Department,
    Title,
    Speaker,
    Coordinator,
    Footer,
}

impl BandName {
    pub fn as_str(self) -> &'static str {
        match self {
            BandName::Header => "header",
            BandName::Department => "department",
            BandName::Title => "title",
            BandName::Speaker => "speaker",
            BandName::Coordinator => "coordinator",
            BandName::Footer => "footer",
        }
    }
}

impl fmt::Display for BandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recogniser page-segmentation mode (the Tesseract `--psm` numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    /// Fully automatic page segmentation (psm 3).
    Auto,
    /// A single column of text of variable sizes (psm 4).
    SingleColumn,
    /// A single uniform block of text (psm 6).
    SingleBlock,
    /// A single text line (psm 7).
    SingleLine,
    /// As much text as possible in no particular order (psm 11).
    SparseText,
}

impl PageSegMode {
    /// Alternates tried after a band's primary mode, in this order.
    pub const ALTERNATES: [PageSegMode; 3] = [
        PageSegMode::SingleBlock,
        PageSegMode::Auto,
        PageSegMode::SingleColumn,
    ];

    /// Numeric mode as understood by Tesseract.
    pub fn as_tesseract(self) -> u8 {
        match self {
            PageSegMode::Auto => 3,
            PageSegMode::SingleColumn => 4,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleLine => 7,
            PageSegMode::SparseText => 11,
        }
    }
}

/// One band cut from a poster image.
#[derive(Debug, Clone)]
pub struct Band {
    pub name: BandName,
    /// First pixel row (inclusive).
    pub top: u32,
    /// Last pixel row (exclusive).
    pub bottom: u32,
    pub psm: PageSegMode,
    pub image: RgbImage,
}

/// Ordered, non-overlapping bands of one image.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    pub bands: Vec<Band>,
}

impl RegionSet {
    pub fn get(&self, name: BandName) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

// ── OCR results ──────────────────────────────────────────────────────────

/// One recognition result for a (variant, mode) combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrCandidate {
    pub text: String,
    /// Heuristic quality in `[0, 1]`.
    pub confidence: f32,
    pub variant: Variant,
    pub psm: PageSegMode,
}

/// Ranked recognition output for one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandResult {
    pub band: BandName,
    pub best_text: String,
    /// Newline-joined text of the top candidates.
    pub combined_text: String,
    pub confidence: f32,
    /// At most five candidates, best first.
    pub top_candidates: Vec<OcrCandidate>,
}

impl BandResult {
    /// Result for a band where nothing legible survived.
    pub fn empty(band: BandName) -> Self {
        Self {
            band,
            best_text: String::new(),
            combined_text: String::new(),
            confidence: 0.0,
            top_candidates: Vec::new(),
        }
    }
}

/// Per-band best text handed to the field extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandTexts {
    texts: BTreeMap<BandName, String>,
}

impl BandTexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, band: BandName, text: impl Into<String>) {
        self.texts.insert(band, text.into());
    }

    pub fn get(&self, band: BandName) -> &str {
        self.texts.get(&band).map(String::as_str).unwrap_or("")
    }
}

impl From<&[BandResult]> for BandTexts {
    fn from(results: &[BandResult]) -> Self {
        let mut texts = Self::new();
        for r in results {
            texts.insert(r.band, r.best_text.clone());
        }
        texts
    }
}

// ── Fields ───────────────────────────────────────────────────────────────

/// The canonical fields of a document template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    GuestName,
    GuestDesignation,
    EventDate,
    ActivityCode,
    Year,
    OrganizerDepartment,
    OrganizerFacultyName,
    Topic,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::GuestName,
        Field::GuestDesignation,
        Field::EventDate,
        Field::ActivityCode,
        Field::Year,
        Field::OrganizerDepartment,
        Field::OrganizerFacultyName,
        Field::Topic,
    ];

    /// Key used in templates and serialised records.
    pub fn key(self) -> &'static str {
        match self {
            Field::GuestName => "Guest Name",
            Field::GuestDesignation => "Guest Designation",
            Field::EventDate => "Event Date",
            Field::ActivityCode => "Activity Code",
            Field::Year => "Year",
            Field::OrganizerDepartment => "Organizer Department",
            Field::OrganizerFacultyName => "Organizer Faculty Name",
            Field::Topic => "Topic",
        }
    }
}

/// The fixed eight-key field set. Every key is always present; absent
/// values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    #[serde(rename = "Guest Name", default)]
    pub guest_name: String,
    #[serde(rename = "Guest Designation", default)]
    pub guest_designation: String,
    #[serde(rename = "Event Date", default)]
    pub event_date: String,
    #[serde(rename = "Activity Code", default)]
    pub activity_code: String,
    #[serde(rename = "Year", default)]
    pub year: String,
    #[serde(rename = "Organizer Department", default)]
    pub organizer_department: String,
    #[serde(rename = "Organizer Faculty Name", default)]
    pub organizer_faculty_name: String,
    #[serde(rename = "Topic", default)]
    pub topic: String,
}

impl FieldRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::GuestName => &self.guest_name,
            Field::GuestDesignation => &self.guest_designation,
            Field::EventDate => &self.event_date,
            Field::ActivityCode => &self.activity_code,
            Field::Year => &self.year,
            Field::OrganizerDepartment => &self.organizer_department,
            Field::OrganizerFacultyName => &self.organizer_faculty_name,
            Field::Topic => &self.topic,
        }
    }

    /// Return a new record with one field replaced.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        let value = value.into();
        match field {
            Field::GuestName => self.guest_name = value,
            Field::GuestDesignation => self.guest_designation = value,
            Field::EventDate => self.event_date = value,
            Field::ActivityCode => self.activity_code = value,
            Field::Year => self.year = value,
            Field::OrganizerDepartment => self.organizer_department = value,
            Field::OrganizerFacultyName => self.organizer_faculty_name = value,
            Field::Topic => self.topic = value,
        }
        self
    }

    /// Return a new record where every empty field takes the value from `other`.
    pub fn or(self, other: &FieldRecord) -> Self {
        Field::ALL.iter().fold(self, |record, &field| {
            if record.get(field).is_empty() && !other.get(field).is_empty() {
                let value = other.get(field).to_string();
                record.with(field, value)
            } else {
                record
            }
        })
    }

    /// `(key, value)` pairs in canonical order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        Field::ALL.iter().map(|&f| (f.key(), self.get(f))).collect()
    }

    /// Number of non-empty fields.
    pub fn filled(&self) -> usize {
        Field::ALL.iter().filter(|&&f| !self.get(f).is_empty()).count()
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Ordered section title → body mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMapping {
    entries: Vec<(String, String)>,
}

impl SectionMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a section, replacing the body of an existing title in place.
    pub fn insert(&mut self, title: impl Into<String>, body: impl Into<String>) {
        let title = title.into();
        let body = body.into();
        match self.entries.iter_mut().find(|(t, _)| *t == title) {
            Some(entry) => entry.1 = body,
            None => self.entries.push((title, body)),
        }
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, b)| b.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, b)| (t.as_str(), b.as_str()))
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Render as `{"sections": {...}}`, the shape the repair cascade parses.
    pub fn to_json(&self) -> String {
        let sections: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(t, b)| (t.clone(), serde_json::Value::String(b.clone())))
            .collect();
        serde_json::json!({ "sections": sections }).to_string()
    }
}

impl FromIterator<(String, String)> for SectionMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut mapping = SectionMapping::new();
        for (title, body) in iter {
            mapping.insert(title, body);
        }
        mapping
    }
}

impl Serialize for SectionMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (title, body) in &self.entries {
            map.serialize_entry(title, body)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SectionMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionsVisitor;

        impl<'de> Visitor<'de> for SectionsVisitor {
            type Value = SectionMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of section titles to bodies")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut mapping = SectionMapping::new();
                while let Some((title, body)) = access.next_entry::<String, String>()? {
                    mapping.insert(title, body);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(SectionsVisitor)
    }
}

// ── Results ──────────────────────────────────────────────────────────────

/// A generated report assembled from a repaired completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    /// All section bodies joined by a single space.
    pub content: String,
    pub word_count: usize,
    pub sections: SectionMapping,
    pub metadata: BTreeMap<String, String>,
}

/// Final payload of a successful request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionResult {
    Fields(FieldRecord),
    Document(GeneratedDocument),
}

impl ExtractionResult {
    pub fn fields(&self) -> Option<&FieldRecord> {
        match self {
            ExtractionResult::Fields(r) => Some(r),
            ExtractionResult::Document(_) => None,
        }
    }

    pub fn document(&self) -> Option<&GeneratedDocument> {
        match self {
            ExtractionResult::Document(d) => Some(d),
            ExtractionResult::Fields(_) => None,
        }
    }
}
