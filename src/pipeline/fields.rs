//! Heuristic field extractor: recognised text → [`FieldRecord`].
//!
//! Input is either the per-band best texts of a poster or one flat document
//! text. Extraction runs in three steps:
//!
//! 1. **Lines and anchors.** Profile text corrections are applied, blank
//!    lines dropped, and a single pass records the landmark lines:
//!    `DEPARTMENT OF`, `GUEST SPEAKER`, the coordinator header, the first
//!    standalone date, and the first footer role word in the last
//!    `footer_fraction` of lines.
//! 2. **Ordered strategies.** Each field has a chain of strategies tried in
//!    order; the first that yields a value wins. A field whose chain runs dry
//!    stays empty. Nothing here fails.
//! 3. **Flat documents only:** explicit `Label: value` lines are read first
//!    and take precedence over every heuristic value.
//!
//! The topic is returned as reconstructed lines; [`clean_topic`] runs the
//! title deduplicator over it. [`FieldExtractor::extract`] does both.

use crate::error::ExtractError;
use crate::model::{BandName, BandTexts, Field, FieldRecord};
use crate::pipeline::dedup::{clean_title, has_role_keyword};
use crate::profile::TemplateProfile;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

// ── Dates ────────────────────────────────────────────────────────────────

static RE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4}|\d{2})\b").unwrap());

/// Lines longer than this are mixed content, not a date line.
const DATE_LINE_MAX_CHARS: usize = 40;

/// Lines searched after the coordinator header.
const COORDINATOR_WINDOW: usize = 3;

/// Lines searched after a guest name for the designation.
const DESIGNATION_WINDOW: usize = 3;

/// A normalised event date and the year taken from the same match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDate {
    /// `D-M-YYYY`, day and month digits as written.
    pub date: String,
    pub year: String,
}

/// Find the first plausible day-month-year in `text`.
///
/// Separators become `-`; two-digit years become `20YY`.
pub fn parse_date(text: &str) -> Option<EventDate> {
    RE_DATE.captures_iter(text).find_map(|caps| {
        let (day, month, year) = (&caps[1], &caps[2], &caps[3]);
        let d: u32 = day.parse().ok()?;
        let m: u32 = month.parse().ok()?;
        if !(1..=31).contains(&d) || !(1..=12).contains(&m) {
            return None;
        }
        let year = if year.len() == 2 {
            format!("20{year}")
        } else {
            year.to_string()
        };
        Some(EventDate {
            date: format!("{day}-{month}-{year}"),
            year,
        })
    })
}

// ── Inputs ───────────────────────────────────────────────────────────────

/// What the extractor reads.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    /// Poster path: best text per band.
    Bands(&'a BandTexts),
    /// Document path: one flat text.
    Flat(&'a str),
}

/// Last-resort department recognition, e.g. re-reading a coloured ribbon.
pub trait DepartmentFallback {
    fn recognize_department(&self) -> Option<String>;
}

impl<F: Fn() -> Option<String>> DepartmentFallback for F {
    fn recognize_department(&self) -> Option<String> {
        self()
    }
}

#[derive(Debug, Clone)]
struct Line {
    text: String,
    upper: String,
    band: Option<BandName>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Anchors {
    department: Option<usize>,
    speaker: Option<usize>,
    coordinator: Option<usize>,
    date: Option<usize>,
    footer: Option<usize>,
}

const DEPARTMENT_MARKER: &str = "DEPARTMENT OF";
const SPEAKER_MARKER: &str = "GUEST SPEAKER";
const COORDINATOR_MARKERS: [&str; 2] = ["CO-ORDINATOR", "COORDINATOR"];

// Marker positions are taken on the original text; uppercasing can change
// byte lengths.
static RE_DEPARTMENT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)DEPARTMENT OF").unwrap());
static RE_COORDINATOR_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)CO-?ORDINATOR").unwrap());

/// Everything a strategy may look at.
struct Ctx<'a> {
    profile: &'a TemplateProfile,
    honorific: &'a Regex,
    lines: Vec<Line>,
    anchors: Anchors,
    fallback: Option<&'a dyn DepartmentFallback>,
    poster: bool,
}

impl Ctx<'_> {
    fn is_honorific(&self, idx: usize) -> bool {
        self.honorific.is_match(&self.lines[idx].text)
    }

    fn is_date_line(&self, idx: usize) -> bool {
        let line = &self.lines[idx];
        line.text.chars().count() <= DATE_LINE_MAX_CHARS && parse_date(&line.text).is_some()
    }

    fn is_coordinator_line(&self, idx: usize) -> bool {
        COORDINATOR_MARKERS.iter().any(|m| self.lines[idx].upper.contains(m))
    }

    /// Lines from `start` up to the footer (or the end).
    fn until_footer(&self, start: usize) -> std::ops::Range<usize> {
        let end = self.anchors.footer.unwrap_or(self.lines.len());
        start.min(end)..end
    }
}

/// A strategy sees the context and the fields derived so far.
type Strategy = fn(&Ctx<'_>, &FieldRecord) -> Option<String>;

fn first_success(name: &str, chain: &[(&str, Strategy)], cx: &Ctx<'_>, so_far: &FieldRecord) -> Option<String> {
    chain.iter().find_map(|(label, strategy)| {
        let value = strategy(cx, so_far)?;
        let value = value.trim().to_string();
        if value.is_empty() {
            return None;
        }
        trace!("{} resolved by {}", name, label);
        Some(value)
    })
}

// ── Extractor ────────────────────────────────────────────────────────────

/// Field extractor bound to one template profile.
#[derive(Debug, Clone)]
pub struct FieldExtractor<'p> {
    profile: &'p TemplateProfile,
    honorific: Regex,
}

impl<'p> FieldExtractor<'p> {
    pub fn new(profile: &'p TemplateProfile) -> Result<Self, ExtractError> {
        let alternation = profile
            .honorifics
            .iter()
            .map(|h| regex::escape(h))
            .collect::<Vec<_>>()
            .join("|");
        let honorific = Regex::new(&format!(r"(?i)^(?:{alternation})(?:\.\s*|\s+)\S"))
            .map_err(|e| ExtractError::InvalidProfile(format!("honorifics: {e}")))?;
        Ok(Self { profile, honorific })
    }

    /// Extract all fields and clean the topic.
    pub fn extract(&self, source: FieldSource<'_>, fallback: Option<&dyn DepartmentFallback>) -> FieldRecord {
        clean_topic(self.extract_raw(source, fallback), self.profile)
    }

    /// Extract all fields; the topic keeps its reconstructed line breaks.
    pub fn extract_raw(&self, source: FieldSource<'_>, fallback: Option<&dyn DepartmentFallback>) -> FieldRecord {
        let cx = self.context(source, fallback);
        let heuristic = heuristics(&cx);
        let record = match source {
            FieldSource::Flat(text) => labelled_fields(text).or(&heuristic),
            FieldSource::Bands(_) => heuristic,
        };
        let record = with_activity_code(record, &self.profile.activity_code_prefix);
        debug!("extracted {}/{} fields", record.filled(), Field::ALL.len());
        record
    }

    fn context<'a>(&'a self, source: FieldSource<'_>, fallback: Option<&'a dyn DepartmentFallback>) -> Ctx<'a> {
        let mut lines = Vec::new();
        match source {
            FieldSource::Bands(texts) => {
                for spec in &self.profile.bands {
                    self.push_lines(&mut lines, texts.get(spec.name), Some(spec.name));
                }
            }
            FieldSource::Flat(text) => self.push_lines(&mut lines, text, None),
        }
        let anchors = find_anchors(&lines, self.profile);
        trace!("anchors: {:?}", anchors);
        Ctx {
            profile: self.profile,
            honorific: &self.honorific,
            lines,
            anchors,
            fallback,
            poster: matches!(source, FieldSource::Bands(_)),
        }
    }

    fn push_lines(&self, lines: &mut Vec<Line>, text: &str, band: Option<BandName>) {
        for raw in text.lines() {
            let corrected = self
                .profile
                .text_corrections
                .iter()
                .filter(|c| !c.from.is_empty())
                .fold(raw.to_string(), |acc, c| acc.replace(&c.from, &c.to));
            let text = corrected.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                continue;
            }
            lines.push(Line {
                upper: text.to_uppercase(),
                text,
                band,
            });
        }
    }
}

/// Convenience wrapper: build an extractor for `profile` and run it.
pub fn extract_fields(
    source: FieldSource<'_>,
    profile: &TemplateProfile,
    fallback: Option<&dyn DepartmentFallback>,
) -> Result<FieldRecord, ExtractError> {
    Ok(FieldExtractor::new(profile)?.extract(source, fallback))
}

/// Run the title deduplicator over the record's topic.
pub fn clean_topic(record: FieldRecord, profile: &TemplateProfile) -> FieldRecord {
    let cleaned = clean_title(&record.topic, &profile.admin_role_keywords);
    record.with(Field::Topic, cleaned)
}

fn find_anchors(lines: &[Line], profile: &TemplateProfile) -> Anchors {
    let footer_start = (lines.len() as f32 * (1.0 - profile.footer_fraction)).floor() as usize;
    let mut a = Anchors::default();
    for (i, line) in lines.iter().enumerate() {
        if a.department.is_none() && line.upper.contains(DEPARTMENT_MARKER) {
            a.department = Some(i);
        }
        if a.speaker.is_none() && line.upper.contains(SPEAKER_MARKER) {
            a.speaker = Some(i);
        }
        if a.coordinator.is_none() && COORDINATOR_MARKERS.iter().any(|m| line.upper.contains(m)) {
            a.coordinator = Some(i);
        }
        if a.date.is_none()
            && line.text.chars().count() <= DATE_LINE_MAX_CHARS
            && parse_date(&line.text).is_some()
        {
            a.date = Some(i);
        }
        if a.footer.is_none() && i >= footer_start && has_role_keyword(&line.text, &profile.footer_keywords) {
            a.footer = Some(i);
        }
    }
    a
}

fn heuristics(cx: &Ctx<'_>) -> FieldRecord {
    let mut record = FieldRecord::default();

    if let Some(dept) = first_success("department", DEPARTMENT, cx, &record) {
        record = record.with(Field::OrganizerDepartment, dept);
    }
    if let Some((name, designation)) = guest(cx) {
        record = record
            .with(Field::GuestName, name)
            .with(Field::GuestDesignation, designation);
    }
    if let Some(date) = cx.anchors.date.and_then(|i| parse_date(&cx.lines[i].text)) {
        record = record
            .with(Field::EventDate, date.date)
            .with(Field::Year, date.year);
    }
    if let Some(coordinator) = first_success("coordinator", COORDINATOR, cx, &record) {
        record = record.with(Field::OrganizerFacultyName, coordinator);
    }
    if let Some(topic) = topic(cx, &record) {
        record = record.with(Field::Topic, topic);
    }
    record
}

fn with_activity_code(record: FieldRecord, prefix: &str) -> FieldRecord {
    if !record.activity_code.is_empty() {
        return record;
    }
    let digits: Vec<char> = record.year.chars().filter(char::is_ascii_digit).collect();
    let suffix: String = if digits.len() >= 2 {
        digits[digits.len() - 2..].iter().collect()
    } else {
        String::new()
    };
    let code = format!("{prefix}{suffix}");
    record.with(Field::ActivityCode, code)
}

// ── Department ───────────────────────────────────────────────────────────

const DEPARTMENT: &[(&str, Strategy)] = &[
    ("same line", dept_same_line),
    ("next line", dept_next_line),
    ("abbreviation", dept_abbreviation),
    ("full name", dept_full_name),
    ("highlight", dept_highlight),
];

fn dept_same_line(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    let line = &cx.lines[cx.anchors.department?];
    let rest = after_marker(&line.text, &RE_DEPARTMENT_MARKER)?;
    Some(canonical_department(rest, cx.profile))
}

fn dept_next_line(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    let next = cx.anchors.department? + 1;
    if next >= cx.lines.len() || cx.is_honorific(next) || cx.is_date_line(next) {
        return None;
    }
    Some(canonical_department(&cx.lines[next].text, cx.profile))
}

fn dept_abbreviation(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    cx.lines
        .iter()
        .find_map(|line| abbreviation_in(&line.text, cx.profile))
}

fn dept_full_name(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    cx.lines
        .iter()
        .find_map(|line| full_name_in(&line.upper, cx.profile))
}

fn dept_highlight(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    let text = cx.fallback?.recognize_department()?;
    debug!("department from highlight region: {:?}", text);
    if let Some(rest) = after_marker(&text, &RE_DEPARTMENT_MARKER) {
        return Some(canonical_department(rest, cx.profile));
    }
    let upper = text.to_uppercase();
    abbreviation_in(&text, cx.profile)
        .or_else(|| full_name_in(&upper, cx.profile))
        .or_else(|| text.lines().map(str::trim).find(|l| !l.is_empty()).map(str::to_string))
}

/// Text after the first `marker` match in `text`, trimmed of punctuation;
/// `None` if blank.
fn after_marker<'t>(text: &'t str, marker: &Regex) -> Option<&'t str> {
    let rest = &text[marker.find(text)?.end()..];
    let rest = rest.trim_matches(|c: char| !c.is_alphanumeric() && c != '(' && c != ')');
    (!rest.is_empty()).then_some(rest)
}

/// Map an exact abbreviation to its full name; keep anything else.
fn canonical_department(text: &str, profile: &TemplateProfile) -> String {
    let bare = text.trim().trim_matches(|c: char| !c.is_alphanumeric());
    profile
        .department_abbreviations
        .iter()
        .find(|a| a.alias.eq_ignore_ascii_case(bare))
        .map(|a| a.name.clone())
        .unwrap_or_else(|| text.trim().to_string())
}

/// A standalone uppercase abbreviation token. Two-letter abbreviations
/// (`IT`, `ME`, `CE`) count only on short lines or inside parentheses.
fn abbreviation_in(text: &str, profile: &TemplateProfile) -> Option<String> {
    let token_count = text.split_whitespace().count();
    for raw in text.split_whitespace() {
        let parenthesised = raw.starts_with('(') || raw.ends_with(')');
        for token in raw.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let Some(alias) = profile.department_abbreviations.iter().find(|a| a.alias == token) else {
                continue;
            };
            if alias.alias.len() <= 2 && !(parenthesised || token_count <= 3) {
                continue;
            }
            return Some(alias.name.clone());
        }
    }
    None
}

fn full_name_in(upper: &str, profile: &TemplateProfile) -> Option<String> {
    profile
        .department_names
        .iter()
        .find(|a| upper.contains(&a.alias.to_uppercase()))
        .map(|a| a.name.clone())
}

// ── Guest ────────────────────────────────────────────────────────────────

/// Name before the first comma or parenthesis.
fn person_name(line: &str) -> (String, String) {
    let cut = line.find([',', '(']).unwrap_or(line.len());
    let name = line[..cut].trim().trim_end_matches(|c: char| c == '-' || c == ':').trim();
    let rest = line[cut..].trim_matches(|c: char| c == ',' || c.is_whitespace());
    (name.to_string(), rest.to_string())
}

fn guest(cx: &Ctx<'_>) -> Option<(String, String)> {
    let n = cx.lines.len();
    let after_anchor = cx.anchors.speaker.map(|s| s + 1..n);
    let pools: Vec<Vec<usize>> = if cx.poster {
        let band: Vec<usize> = (0..n)
            .filter(|&i| cx.lines[i].band == Some(BandName::Speaker))
            .collect();
        vec![band, after_anchor.map(|r| r.collect()).unwrap_or_default()]
    } else {
        let before_coordinator = 0..cx.anchors.coordinator.unwrap_or(n);
        vec![
            after_anchor.map(|r| r.collect()).unwrap_or_default(),
            before_coordinator.collect(),
        ]
    };

    let name_idx = pools
        .iter()
        .find_map(|pool| pool.iter().copied().find(|&i| cx.is_honorific(i)))?;
    let (name, remainder) = person_name(&cx.lines[name_idx].text);

    let acceptable = |j: usize| {
        !cx.is_honorific(j)
            && !cx.is_date_line(j)
            && !cx.is_coordinator_line(j)
            && !cx.lines[j].upper.contains(SPEAKER_MARKER)
            && Some(j) != cx.anchors.footer
    };
    let stop = |j: usize| cx.is_coordinator_line(j) || Some(j) == cx.anchors.footer;

    let mut designation_idx = None;
    for j in (name_idx + 1..n).take(DESIGNATION_WINDOW) {
        if stop(j) {
            break;
        }
        if acceptable(j) {
            designation_idx = Some(j);
            break;
        }
    }

    let designation = match designation_idx {
        Some(j) => {
            let mut designation = cx.lines[j].text.clone();
            let extra = j + 1;
            if extra < n && acceptable(extra) && cx.lines[extra].band == cx.lines[j].band {
                let known: Vec<String> = designation
                    .split_whitespace()
                    .map(|t| t.to_uppercase())
                    .collect();
                let novel = cx.lines[extra]
                    .upper
                    .split_whitespace()
                    .any(|t| !known.iter().any(|k| k == t));
                if novel {
                    designation = format!("{}, {}", designation, cx.lines[extra].text);
                }
            }
            designation
        }
        None => remainder,
    };
    Some((name, designation))
}

// ── Coordinator ──────────────────────────────────────────────────────────

const COORDINATOR: &[(&str, Strategy)] = &[
    ("header window", coordinator_window),
    ("HOD line", coordinator_hod),
    ("after date", coordinator_after_date),
];

fn coordinator_window(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    let idx = cx.anchors.coordinator?;
    let line = &cx.lines[idx];
    let same_line =
        after_marker(&line.text, &RE_COORDINATOR_MARKER).filter(|rest| cx.honorific.is_match(rest));
    if let Some(rest) = same_line {
        return Some(person_name(rest).0);
    }
    (idx + 1..cx.lines.len())
        .take(COORDINATOR_WINDOW)
        .find(|&j| cx.is_honorific(j))
        .map(|j| person_name(&cx.lines[j].text).0)
}

fn coordinator_hod(cx: &Ctx<'_>, _: &FieldRecord) -> Option<String> {
    let hod = ["HOD".to_string()];
    cx.until_footer(cx.lines.len() / 2)
        .find(|&j| cx.is_honorific(j) && has_role_keyword(&cx.lines[j].text, &hod))
        .map(|j| person_name(&cx.lines[j].text).0)
}

fn coordinator_after_date(cx: &Ctx<'_>, so_far: &FieldRecord) -> Option<String> {
    let start = cx.anchors.date? + 1;
    cx.until_footer(start)
        .filter(|&j| cx.is_honorific(j))
        .map(|j| person_name(&cx.lines[j].text).0)
        .find(|name| !name.eq_ignore_ascii_case(&so_far.guest_name))
}

// ── Topic ────────────────────────────────────────────────────────────────

fn uppercase_ratio(text: &str) -> f32 {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return 0.0;
    }
    letters.iter().filter(|c| c.is_uppercase()).count() as f32 / letters.len() as f32
}

fn has_title_keyword(upper: &str, keywords: &[String]) -> bool {
    upper
        .split(|c: char| !c.is_alphanumeric())
        .any(|t| keywords.iter().any(|k| k.eq_ignore_ascii_case(t)))
}

fn topic(cx: &Ctx<'_>, so_far: &FieldRecord) -> Option<String> {
    let n = cx.lines.len();
    let mut window: Vec<usize> = if cx.poster {
        (0..n)
            .filter(|&i| cx.lines[i].band == Some(BandName::Title))
            .collect()
    } else {
        Vec::new()
    };
    if window.is_empty() {
        let start = cx.anchors.department.map_or(0, |d| d + 1);
        let end = cx.anchors.speaker.or(cx.anchors.date).unwrap_or(n).max(start);
        window = (start..end).collect();
    }

    let p = cx.profile;
    let candidates: Vec<&str> = window
        .into_iter()
        .filter(|&i| {
            let line = &cx.lines[i];
            !line.upper.contains(DEPARTMENT_MARKER)
                && !line.upper.contains(SPEAKER_MARKER)
                && !line.text.eq_ignore_ascii_case(&so_far.organizer_department)
                && !cx.is_honorific(i)
                && !cx.is_date_line(i)
                && !cx.is_coordinator_line(i)
        })
        .map(|i| &cx.lines[i])
        .filter(|line| {
            has_title_keyword(&line.upper, &p.title_keywords)
                || (uppercase_ratio(&line.text) > p.title_uppercase_ratio
                    && line.text.chars().count() >= p.title_min_len)
        })
        .map(|line| line.text.as_str())
        .collect();

    if candidates.is_empty() {
        return None;
    }
    Some(join_continued(&candidates))
}

/// Newline-join lines; a line ending in `-` continues directly into the next.
fn join_continued(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        if !out.is_empty() && !out.ends_with('-') {
            out.push('\n');
        }
        out.push_str(line);
    }
    out
}

// ── Labelled fields ──────────────────────────────────────────────────────

static LABELS: Lazy<Vec<(Field, Regex)>> = Lazy::new(|| {
    [
        (
            Field::GuestName,
            r"guest\s*(?:name|speaker)|guest|speaker(?:\s*name)?|resource\s*person",
        ),
        (Field::GuestDesignation, r"(?:guest\s*)?designation"),
        (Field::Topic, r"topic|title"),
        (Field::EventDate, r"(?:event\s*)?date"),
        (Field::ActivityCode, r"activity\s*code"),
        (Field::Year, r"(?:academic\s*)?year"),
        (Field::OrganizerDepartment, r"(?:organi[sz]er\s*)?department"),
        (
            Field::OrganizerFacultyName,
            r"(?:organi[sz]er\s*)?faculty(?:\s*name)?|co-?ordinator|organi[sz]ed\s*by",
        ),
    ]
    .into_iter()
    .map(|(field, label)| {
        let re = Regex::new(&format!(r"(?im)^[ \t]*(?:{label})[ \t]*:[ \t]*(.+)$")).unwrap();
        (field, re)
    })
    .collect()
});

/// Read explicit `Label: value` lines from a flat document.
pub fn labelled_fields(text: &str) -> FieldRecord {
    let mut record = LABELS.iter().fold(FieldRecord::default(), |record, (field, re)| {
        match re.captures(text).map(|c| c[1].trim().to_string()) {
            Some(value) if !value.is_empty() => record.with(*field, value),
            _ => record,
        }
    });
    if let Some(date) = parse_date(&record.event_date) {
        if record.year.is_empty() {
            record = record.with(Field::Year, date.year);
        }
        record = record.with(Field::EventDate, date.date);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn profile() -> TemplateProfile {
        TemplateProfile::default()
    }

    fn poster() -> BandTexts {
        let mut t = BandTexts::new();
        t.insert(BandName::Header, "ABC COLLEGE OF ENGINEERING\nAUTONOMOUS");
        t.insert(BandName::Department, "DEPARTMENTOF COMPUTER SCIENCE ENGINEERING");
        t.insert(BandName::Title, "AI WORKSHOP\nAI WORKSHOP ON ROBOTICS");
        t.insert(
            BandName::Speaker,
            "GUEST SPEAKER\nDR. JOHN DOE\nSENIOR SCIENTIST\nISRO BANGALORE",
        );
        t.insert(BandName::Coordinator, "CO-ORDINATOR\nMS. JANE ROE\n12.03.2024");
        t.insert(BandName::Footer, "PRINCIPAL");
        t
    }

    const FLAT: &str = "DEPARTMENT OF\nCSE\nONE DAY WORKSHOP ON CLOUD-\nNATIVE SYSTEMS\n\
GUEST SPEAKER\nProf. Alan Kay, Fellow\nVisionary Labs\nDate: 5-6-23\nDr. R. Rao (HOD)\nPRINCIPAL";

    fn extract(source: FieldSource<'_>) -> FieldRecord {
        extract_fields(source, &profile(), None).unwrap()
    }

    #[test]
    fn two_digit_year_expanded() {
        let d = parse_date("5-6-23").unwrap();
        assert_eq!(d.date, "5-6-2023");
        assert_eq!(d.year, "2023");
    }

    #[test]
    fn date_separators_normalised() {
        assert_eq!(parse_date("on 12.03.2024").unwrap().date, "12-03-2024");
        assert_eq!(parse_date("12/3/2024").unwrap().year, "2024");
        assert!(parse_date("45-13-2024").is_none());
        assert!(parse_date("no date here").is_none());
    }

    #[test]
    fn poster_bands_fill_every_field() {
        let texts = poster();
        let r = extract(FieldSource::Bands(&texts));
        assert_eq!(r.organizer_department, "COMPUTER SCIENCE ENGINEERING");
        assert_eq!(r.guest_name, "DR. JOHN DOE");
        assert_eq!(r.guest_designation, "SENIOR SCIENTIST, ISRO BANGALORE");
        assert_eq!(r.event_date, "12-03-2024");
        assert_eq!(r.year, "2024");
        assert_eq!(r.activity_code, "GL24");
        assert_eq!(r.organizer_faculty_name, "MS. JANE ROE");
        assert_eq!(r.topic, "AI WORKSHOP ON ROBOTICS");
    }

    #[test]
    fn raw_topic_keeps_lines_for_cleanup() {
        let texts = poster();
        let profile = profile();
        let ex = FieldExtractor::new(&profile).unwrap();
        let raw = ex.extract_raw(FieldSource::Bands(&texts), None);
        assert_eq!(raw.topic, "AI WORKSHOP\nAI WORKSHOP ON ROBOTICS");
    }

    #[test]
    fn flat_text_uses_fallback_strategies() {
        let r = extract(FieldSource::Flat(FLAT));
        assert_eq!(r.organizer_department, "COMPUTER SCIENCE ENGINEERING");
        assert_eq!(r.topic, "ONE DAY WORKSHOP ON CLOUD-NATIVE SYSTEMS");
        assert_eq!(r.guest_name, "Prof. Alan Kay");
        assert_eq!(r.guest_designation, "Visionary Labs");
        assert_eq!(r.event_date, "5-6-2023");
        assert_eq!(r.year, "2023");
        assert_eq!(r.activity_code, "GL23");
        assert_eq!(r.organizer_faculty_name, "Dr. R. Rao");
    }

    #[test]
    fn standalone_abbreviation_resolves() {
        let r = extract(FieldSource::Flat("Organised by CSE students"));
        assert_eq!(r.organizer_department, "COMPUTER SCIENCE ENGINEERING");
    }

    #[test]
    fn embedded_or_lowercase_abbreviations_ignored() {
        let r = extract(FieldSource::Flat("We discussed how it works in CSEDU labs"));
        assert_eq!(r.organizer_department, "");
    }

    #[test]
    fn two_letter_abbreviation_needs_short_line_or_parentheses() {
        let long = extract(FieldSource::Flat("ALL ABOUT ME AND MY CAREER PATH"));
        assert_eq!(long.organizer_department, "");
        let paren = extract(FieldSource::Flat("Hosted by the students of the department (IT) today"));
        assert_eq!(paren.organizer_department, "INFORMATION TECHNOLOGY");
    }

    #[test]
    fn full_name_substring_resolves() {
        let r = extract(FieldSource::Flat("Organised by Mechanical Engineering Association"));
        assert_eq!(r.organizer_department, "MECHANICAL ENGINEERING");
    }

    #[test]
    fn highlight_fallback_only_when_needed() {
        let calls = Cell::new(0);
        let fallback = || {
            calls.set(calls.get() + 1);
            Some("DEPARTMENT OF ECE".to_string())
        };
        let p = profile();
        let ex = FieldExtractor::new(&p).unwrap();

        let mut texts = BandTexts::new();
        texts.insert(BandName::Title, "NATIONAL SEMINAR");
        let r = ex.extract(FieldSource::Bands(&texts), Some(&fallback));
        assert_eq!(r.organizer_department, "ELECTRONICS AND COMMUNICATION ENGINEERING");
        assert_eq!(calls.get(), 1);

        let texts = poster();
        ex.extract(FieldSource::Bands(&texts), Some(&fallback));
        assert_eq!(calls.get(), 1, "fallback must not run when an earlier strategy succeeds");
    }

    #[test]
    fn duplicate_extra_designation_line_not_appended() {
        let mut t = BandTexts::new();
        t.insert(BandName::Speaker, "MR. ARUN\nCHIEF ENGINEER\nENGINEER CHIEF");
        let r = extract(FieldSource::Bands(&t));
        assert_eq!(r.guest_designation, "CHIEF ENGINEER");
    }

    #[test]
    fn coordinator_on_same_line_as_header() {
        let r = extract(FieldSource::Flat("Coordinator - Mrs. Latha, AP/CSE"));
        assert_eq!(r.organizer_faculty_name, "Mrs. Latha");
    }

    #[test]
    fn coordinator_after_date_skips_guest() {
        let text = "GUEST SPEAKER\nDR. A. GUEST\nResearcher\n01-02-2024\nDR. A. GUEST\nPROF. B. HOST\nx\ny\nz\nw\nPRINCIPAL";
        let r = extract(FieldSource::Flat(text));
        assert_eq!(r.guest_name, "DR. A. GUEST");
        assert_eq!(r.organizer_faculty_name, "PROF. B. HOST");
    }

    #[test]
    fn labelled_values_win_over_heuristics() {
        let text = "Topic: Quantum Computing\nGUEST SPEAKER\nDr. X\nTeacher\nEvent Date: 7/8/24\nDepartment: Physics";
        let r = extract(FieldSource::Flat(text));
        assert_eq!(r.topic, "Quantum Computing");
        assert_eq!(r.organizer_department, "Physics");
        assert_eq!(r.event_date, "7-8-2024");
        assert_eq!(r.year, "2024");
        assert_eq!(r.activity_code, "GL24");
        assert_eq!(r.guest_name, "Dr. X");
    }

    #[test]
    fn marker_offsets_survive_case_mapping() {
        // The ligature uppercases to two ASCII letters in fewer bytes.
        let r = extract(FieldSource::Flat("ﬁrst year Department of CSE"));
        assert_eq!(r.organizer_department, "COMPUTER SCIENCE ENGINEERING");
        let r = extract(FieldSource::Flat("ﬁnal year Co-ordinator Dr. R. Rao"));
        assert_eq!(r.organizer_faculty_name, "Dr. R. Rao");
    }

    #[test]
    fn long_mixed_lines_are_not_date_lines() {
        let text = "DATE: 12.03.2024 | TIME: 10 AM | VENUE: MAIN SEMINAR HALL";
        let profile = profile();
        let ex = FieldExtractor::new(&profile).unwrap();
        let r = ex.extract(FieldSource::Bands(&{
            let mut t = BandTexts::new();
            t.insert(BandName::Footer, text);
            t
        }), None);
        assert_eq!(r.event_date, "");
    }

    #[test]
    fn empty_input_yields_empty_fields() {
        let r = extract(FieldSource::Flat(""));
        assert_eq!(r.filled(), 1);
        assert_eq!(r.activity_code, "GL");
        assert_eq!(r.guest_name, "");
        let texts = BandTexts::new();
        assert_eq!(extract(FieldSource::Bands(&texts)).topic, "");
    }

    #[test]
    fn hyphenated_lines_join_without_space() {
        assert_eq!(join_continued(&["MACHINE-", "LEARNING", "BASICS"]), "MACHINE-LEARNING\nBASICS");
    }
}
