//! Template profile: the data that ties extraction to one poster layout.
//!
//! Band fractions, honorifics, the department table, title keywords and the
//! generation templates all describe a single institution's event posters
//! and report formats. They live here as versioned, serialisable data so a
//! different template can be loaded from JSON without touching code.
//! [`TemplateProfile::default()`] is the current institution profile.
//!
//! # Example
//! ```rust
//! use eventdoc_extract::TemplateProfile;
//!
//! let json = r#"{ "name": "campus-b", "activity_code_prefix": "EV" }"#;
//! let profile = TemplateProfile::from_json_str(json).unwrap();
//! assert_eq!(profile.activity_code_prefix, "EV");
//! // Everything not given keeps its default value.
//! assert_eq!(profile.bands.len(), 6);
//! ```

use crate::error::ExtractError;
use crate::model::{BandName, PageSegMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current schema version of [`TemplateProfile`].
pub const PROFILE_VERSION: u32 = 1;

/// One fixed vertical band of the poster template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSpec {
    pub name: BandName,
    /// Inclusive start, as a fraction of image height.
    pub start: f32,
    /// Exclusive end (inclusive for the last band), as a fraction of image height.
    pub end: f32,
    /// Page-segmentation mode tried first for this band.
    pub psm: PageSegMode,
}

impl BandSpec {
    fn new(name: BandName, start: f32, end: f32, psm: PageSegMode) -> Self {
        Self {
            name,
            start,
            end,
            psm,
        }
    }
}

/// Maps an alias (abbreviation or spelling variant) to a canonical department name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentAlias {
    pub alias: String,
    pub name: String,
}

/// A literal replacement applied to recognised lines before anchor detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCorrection {
    pub from: String,
    pub to: String,
}

/// One report section and the guidance given to the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub title: String,
    pub guidance: String,
}

/// A document type accepted on the generation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTemplate {
    /// Identifier used in requests, e.g. `GuestLecture`.
    pub name: String,
    /// Human-readable report name used in prompts.
    pub label: String,
    pub required_fields: Vec<String>,
    pub sections: Vec<SectionSpec>,
}

/// Versioned template data for one institution's posters and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateProfile {
    pub name: String,
    pub version: u32,
    pub bands: Vec<BandSpec>,
    /// Name prefixes that mark a person line (`DR`, `PROF`, ...), without the dot.
    pub honorifics: Vec<String>,
    /// Standalone abbreviations such as `CSE`.
    pub department_abbreviations: Vec<DepartmentAlias>,
    /// Full-name spellings searched as substrings.
    pub department_names: Vec<DepartmentAlias>,
    pub title_keywords: Vec<String>,
    /// Lines carrying these words are never part of a title.
    pub admin_role_keywords: Vec<String>,
    /// Role words that mark the signature footer.
    pub footer_keywords: Vec<String>,
    /// Fraction of trailing lines in which a footer marker may appear.
    pub footer_fraction: f32,
    /// Minimum share of uppercase letters for a keyword-less title line.
    pub title_uppercase_ratio: f32,
    /// Minimum character length for a keyword-less title line.
    pub title_min_len: usize,
    pub activity_code_prefix: String,
    /// Section titles mined directly from unparseable completions.
    pub section_titles: Vec<String>,
    pub document_templates: Vec<DocumentTemplate>,
    pub text_corrections: Vec<TextCorrection>,
}

impl Default for TemplateProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            version: PROFILE_VERSION,
            bands: vec![
                BandSpec::new(BandName::Header, 0.00, 0.20, PageSegMode::SingleBlock),
                BandSpec::new(BandName::Department, 0.20, 0.35, PageSegMode::SingleBlock),
                BandSpec::new(BandName::Title, 0.35, 0.55, PageSegMode::Auto),
                BandSpec::new(BandName::Speaker, 0.55, 0.75, PageSegMode::SingleColumn),
                BandSpec::new(BandName::Coordinator, 0.75, 0.85, PageSegMode::SingleBlock),
                BandSpec::new(BandName::Footer, 0.85, 1.00, PageSegMode::SparseText),
            ],
            honorifics: strings(&["MRS", "MR", "DR", "PROF", "MS"]),
            department_abbreviations: aliases(&[
                ("CSBS", "COMPUTER SCIENCE AND BUSINESS SYSTEMS"),
                ("CSE", "COMPUTER SCIENCE ENGINEERING"),
                ("ECE", "ELECTRONICS AND COMMUNICATION ENGINEERING"),
                ("EEE", "ELECTRICAL AND ELECTRONICS ENGINEERING"),
                ("IT", "INFORMATION TECHNOLOGY"),
                ("ME", "MECHANICAL ENGINEERING"),
                ("CE", "CIVIL ENGINEERING"),
            ]),
            department_names: aliases(&[
                ("COMPUTER SCIENCE AND BUSINESS", "COMPUTER SCIENCE AND BUSINESS SYSTEMS"),
                ("COMPUTER SCIENCE", "COMPUTER SCIENCE ENGINEERING"),
                ("ELECTRONICS AND COMMUNICATION", "ELECTRONICS AND COMMUNICATION ENGINEERING"),
                ("ELECTRICAL AND ELECTRONICS", "ELECTRICAL AND ELECTRONICS ENGINEERING"),
                ("INFORMATION TECHNOLOGY", "INFORMATION TECHNOLOGY"),
                ("MECHANICAL", "MECHANICAL ENGINEERING"),
                ("CIVIL", "CIVIL ENGINEERING"),
            ]),
            title_keywords: strings(&[
                "WORKSHOP",
                "SEMINAR",
                "WEBINAR",
                "LECTURE",
                "SESSION",
                "TALK",
                "CONFERENCE",
                "SYMPOSIUM",
                "TRAINING",
                "BOOTCAMP",
                "HACKATHON",
                "PROGRAMME",
                "PROGRAM",
            ]),
            admin_role_keywords: strings(&[
                "PRINCIPAL",
                "HOD",
                "COORDINATOR",
                "CO-ORDINATOR",
                "CONVENER",
                "CONVENOR",
                "DEAN",
                "DIRECTOR",
                "CHAIRMAN",
                "SECRETARY",
            ]),
            footer_keywords: strings(&["PRINCIPAL", "DIRECTOR", "CHAIRMAN", "SECRETARY", "CEO"]),
            footer_fraction: 0.30,
            title_uppercase_ratio: 0.70,
            title_min_len: 8,
            activity_code_prefix: "GL".to_string(),
            section_titles: strings(&[
                "Introduction and Purpose",
                "About the Guest Speaker",
                "Topic Overview",
                "Learning Objectives",
                "Target Audience and Benefits",
                "Event Details",
                "Expected Outcomes",
                "Registration Process",
                "Detailed Session Plan",
                "Post-Event Impact and Follow-up",
                "Acknowledgments",
            ]),
            document_templates: vec![guest_lecture_template()],
            text_corrections: vec![
                TextCorrection {
                    from: "DEPARTMENTOF".into(),
                    to: "DEPARTMENT OF".into(),
                },
                TextCorrection {
                    from: "GUESTSPEAKER".into(),
                    to: "GUEST SPEAKER".into(),
                },
            ],
        }
    }
}

fn guest_lecture_template() -> DocumentTemplate {
    let sections = [
        ("Event Summary", "Provide an overview, including the date, time, and location. Ensure at least 40-50 words."),
        ("Speaker Details", "Give background information about the speaker. Ensure at least 40-50 words."),
        ("Topic Summary", "Summarize the key aspects of the lecture. Ensure at least 40-50 words."),
        ("Key Discussions and Insights", "Detail the main discussions and takeaways. Ensure at least 40-50 words."),
        ("Audience Engagement and Feedback", "Describe interactions and participant responses. Ensure at least 30-40 words."),
        ("Impact and Learning Outcomes", "Summarize key learnings and benefits for attendees. Ensure at least 30-40 words."),
        ("Future Recommendations", "Suggest improvements for future guest lectures. Ensure at least 30-40 words."),
        ("Acknowledgments", "Thank contributors, sponsors, and organizers. Ensure at least 20-30 words."),
    ];
    DocumentTemplate {
        name: "GuestLecture".to_string(),
        label: "Guest Lecture Report".to_string(),
        required_fields: strings(&[
            "Guest Name",
            "Guest Designation",
            "Event Date",
            "Activity Code",
            "Year",
            "No Of Count",
            "Organizer Department",
            "Organizer Faculty Name",
            "Topic",
        ]),
        sections: sections
            .iter()
            .map(|(title, guidance)| SectionSpec {
                title: title.to_string(),
                guidance: guidance.to_string(),
            })
            .collect(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn aliases(items: &[(&str, &str)]) -> Vec<DepartmentAlias> {
    items
        .iter()
        .map(|(alias, name)| DepartmentAlias {
            alias: alias.to_string(),
            name: name.to_string(),
        })
        .collect()
}

impl TemplateProfile {
    /// Parse a profile from JSON; absent keys keep their default values.
    pub fn from_json_str(json: &str) -> Result<Self, ExtractError> {
        let profile: Self =
            serde_json::from_str(json).map_err(|e| ExtractError::InvalidProfile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load and validate a profile from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ExtractError::InvalidProfile(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Check structural constraints: ordered, non-overlapping bands inside
    /// `[0, 1]`, a known schema version, at least one honorific and no empty
    /// correction pattern.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.version > PROFILE_VERSION {
            return Err(ExtractError::InvalidProfile(format!(
                "profile version {} is newer than supported version {}",
                self.version, PROFILE_VERSION
            )));
        }
        if self.bands.is_empty() {
            return Err(ExtractError::InvalidProfile("no bands defined".into()));
        }
        let mut previous_end = 0.0f32;
        for band in &self.bands {
            if !(0.0..=1.0).contains(&band.start)
                || !(0.0..=1.0).contains(&band.end)
                || band.start >= band.end
            {
                return Err(ExtractError::InvalidProfile(format!(
                    "band {:?} has invalid range [{}, {})",
                    band.name, band.start, band.end
                )));
            }
            if band.start + f32::EPSILON < previous_end {
                return Err(ExtractError::InvalidProfile(format!(
                    "band {:?} overlaps the previous band",
                    band.name
                )));
            }
            previous_end = band.end;
        }
        if self.honorifics.is_empty() {
            return Err(ExtractError::InvalidProfile("no honorifics defined".into()));
        }
        if let Some(i) = self.text_corrections.iter().position(|c| c.from.is_empty()) {
            return Err(ExtractError::InvalidProfile(format!(
                "text_corrections[{i}] has an empty pattern"
            )));
        }
        if !(0.0..=1.0).contains(&self.footer_fraction) {
            return Err(ExtractError::InvalidProfile(format!(
                "footer_fraction {} outside [0, 1]",
                self.footer_fraction
            )));
        }
        Ok(())
    }

    /// Look up a document template by request name.
    pub fn template(&self, name: &str) -> Option<&DocumentTemplate> {
        self.document_templates.iter().find(|t| t.name == name)
    }

    /// Section titles for the mining fallback: the configured list followed by
    /// every template section title not already in it.
    pub fn mining_titles(&self) -> Vec<String> {
        let mut titles = self.section_titles.clone();
        for template in &self.document_templates {
            for section in &template.sections {
                if !titles.contains(&section.title) {
                    titles.push(section.title.clone());
                }
            }
        }
        titles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        let p = TemplateProfile::default();
        p.validate().expect("default profile must validate");
        assert_eq!(p.bands.len(), 6);
        assert_eq!(p.bands[0].name, BandName::Header);
        assert_eq!(p.bands[5].end, 1.0);
    }

    #[test]
    fn overlapping_bands_rejected() {
        let mut p = TemplateProfile::default();
        p.bands[1].start = 0.10;
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("overlaps"), "got: {err}");
    }

    #[test]
    fn inverted_band_rejected() {
        let mut p = TemplateProfile::default();
        p.bands[2].end = p.bands[2].start;
        assert!(p.validate().is_err());
    }

    #[test]
    fn empty_correction_pattern_rejected() {
        let err = TemplateProfile::from_json_str(r#"{"text_corrections":[{"from":"","to":"X"}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("empty pattern"), "got: {err}");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let p = TemplateProfile::from_json_str(r#"{"name":"x","honorifics":["DR"]}"#).unwrap();
        assert_eq!(p.name, "x");
        assert_eq!(p.honorifics, vec!["DR".to_string()]);
        assert_eq!(p.activity_code_prefix, "GL");
    }

    #[test]
    fn malformed_json_is_profile_error() {
        let err = TemplateProfile::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidProfile(_)));
    }

    #[test]
    fn mining_titles_include_template_sections_once() {
        let p = TemplateProfile::default();
        let titles = p.mining_titles();
        assert!(titles.contains(&"Event Summary".to_string()));
        let acks = titles.iter().filter(|t| *t == "Acknowledgments").count();
        assert_eq!(acks, 1);
    }

    #[test]
    fn template_lookup() {
        let p = TemplateProfile::default();
        assert!(p.template("GuestLecture").is_some());
        assert!(p.template("Newsletter").is_none());
    }
}
