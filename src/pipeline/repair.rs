//! JSON repair cascade: turn an almost-JSON completion into sections.
//!
//! Generation backends are asked for `{"sections": {"Title": "Body", ...}}`
//! and frequently return something close to it instead: fenced in
//! ```` ```json ````, single-quoted, with bare keys, trailing commas, literal
//! newlines inside strings, or simply cut off mid-object. The cascade tries
//! four stages, each only when the previous produced no usable `sections`:
//!
//! 1. **Direct**: parse the text as-is.
//! 2. **Repaired**: syntactic repair (below), then parse.
//! 3. **Mined**: regex each known section title straight out of the raw
//!    text, ignoring overall validity.
//! 4. **Fallback**: one synthetic `Content` section holding a prefix of the
//!    raw text.
//!
//! The cascade never fails: the result always has at least one section, and
//! every failed stage leaves a [`ParseAttempt`] behind as a diagnostic.
//!
//! ## Syntactic repair
//!
//! Code fences are stripped and the outermost `{…}` span isolated. The span
//! is then re-read by a lenient tokenizer that accepts single- and
//! double-quoted strings (an inner quote only closes a string when the next
//! non-blank character is structural) and bare words, and re-emitted as
//! compact JSON: bare keys and non-literal bare values are quoted, commas
//! are dropped before closers and inserted between adjacent values, runs of
//! whitespace in keys collapse to one space, and every bracket still open at
//! the end is closed. Closers are only ever added, never removed.

use crate::model::SectionMapping;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Title of the synthetic section produced when nothing else worked.
pub const FALLBACK_SECTION: &str = "Content";

/// Which stage produced the sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairStage {
    Direct,
    Repaired,
    Mined,
    Fallback,
}

impl RepairStage {
    /// 1-based stage number.
    pub fn index(self) -> u8 {
        match self {
            RepairStage::Direct => 1,
            RepairStage::Repaired => 2,
            RepairStage::Mined => 3,
            RepairStage::Fallback => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RepairStage::Direct => "direct",
            RepairStage::Repaired => "repaired",
            RepairStage::Mined => "mined",
            RepairStage::Fallback => "fallback",
        }
    }
}

/// A stage that did not yield sections, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseAttempt {
    pub stage: RepairStage,
    pub error: String,
}

/// Result of running the cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairOutcome {
    pub sections: SectionMapping,
    pub stage: RepairStage,
    pub attempts: Vec<ParseAttempt>,
}

impl RepairOutcome {
    /// Failed-stage errors joined into one diagnostic string.
    pub fn diagnostic(&self) -> Option<String> {
        if self.attempts.is_empty() {
            return None;
        }
        Some(
            self.attempts
                .iter()
                .map(|a| format!("stage {}: {}", a.stage.index(), a.error))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.stage == RepairStage::Fallback
    }
}

/// Run the full cascade over a raw completion.
///
/// `titles` drives stage 3; `excerpt_chars` bounds the raw prefix kept by
/// stage 4.
pub fn repair_sections(raw: &str, titles: &[String], excerpt_chars: usize) -> RepairOutcome {
    let mut attempts = Vec::new();

    match parse_direct(raw) {
        Ok(sections) => return outcome(sections, RepairStage::Direct, attempts),
        Err(e) => attempts.push(ParseAttempt {
            stage: RepairStage::Direct,
            error: e,
        }),
    }

    let repaired = repair_json(raw);
    debug!("repaired completion: {} → {} bytes", raw.len(), repaired.len());
    match parse_direct(&repaired) {
        Ok(sections) => return outcome(sections, RepairStage::Repaired, attempts),
        Err(e) => attempts.push(ParseAttempt {
            stage: RepairStage::Repaired,
            error: e,
        }),
    }

    let mined = mine_sections(raw, titles);
    if !mined.is_empty() {
        return outcome(mined, RepairStage::Mined, attempts);
    }
    attempts.push(ParseAttempt {
        stage: RepairStage::Mined,
        error: "no known section title found".to_string(),
    });

    warn!("completion unparseable; returning raw excerpt");
    let excerpt: String = raw.chars().take(excerpt_chars).collect();
    let mut sections = SectionMapping::new();
    sections.insert(
        FALLBACK_SECTION,
        format!("Failed to parse structured content. Raw response: {excerpt}..."),
    );
    outcome(sections, RepairStage::Fallback, attempts)
}

fn outcome(sections: SectionMapping, stage: RepairStage, attempts: Vec<ParseAttempt>) -> RepairOutcome {
    debug!("sections recovered at stage {} ({})", stage.index(), stage.as_str());
    RepairOutcome {
        sections,
        stage,
        attempts,
    }
}

// ── Stage 1: direct parse ────────────────────────────────────────────────

/// Parse `text` as JSON and pull out a non-empty `sections` value.
pub fn parse_direct(text: &str) -> Result<SectionMapping, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    sections_from_value(&value)
}

/// Accept `sections` as an object of title → body, or as a list of
/// `{title, content}` objects.
fn sections_from_value(value: &Value) -> Result<SectionMapping, String> {
    let sections = value
        .get("sections")
        .ok_or_else(|| "no \"sections\" key".to_string())?;

    let mapping: SectionMapping = match sections {
        Value::Object(map) => map
            .iter()
            .map(|(title, body)| (title.clone(), body_text(body)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let title = item
                    .get("title")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "list item without \"title\"".to_string())?;
                let content = item
                    .get("content")
                    .ok_or_else(|| format!("list item '{title}' without \"content\""))?;
                Ok((title.to_string(), body_text(content)))
            })
            .collect::<Result<SectionMapping, String>>()?,
        other => return Err(format!("\"sections\" is {}", json_kind(other))),
    };

    if mapping.is_empty() {
        return Err("\"sections\" is empty".to_string());
    }
    Ok(mapping)
}

fn body_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(body_text).collect::<Vec<_>>().join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Stage 2: syntactic repair ────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?[ \t]*").unwrap());

/// Best-effort rewrite of almost-JSON into JSON.
pub fn repair_json(raw: &str) -> String {
    let unfenced = RE_FENCE.replace_all(raw, "");
    let span = outermost_object(&unfenced);
    assemble(&tokenize(span))
}

/// First `{` through last `}`; through the end when no `}` follows.
fn outermost_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };
    match text.rfind('}') {
        Some(end) if end > start => &text[start..=end],
        _ => &text[start..],
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(char),
    Close(char),
    Colon,
    Comma,
    Str(String),
    Bare(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '{' | '[' => {
                tokens.push(Token::Open(c));
                i += 1;
            }
            '}' | ']' => {
                tokens.push(Token::Close(c));
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let (s, next) = read_quoted(&chars, i, c);
                tokens.push(Token::Str(s));
                i = next;
            }
            _ => {
                let (s, next) = read_bare(&chars, i);
                tokens.push(Token::Bare(s));
                i = next;
            }
        }
    }
    tokens
}

/// Read a quoted string starting at `start`. Returns the unescaped content
/// and the index just past the closing quote (or the end of input).
fn read_quoted(chars: &[char], start: usize, quote: char) -> (String, usize) {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            let Some(&escaped) = chars.get(i + 1) else {
                i += 1;
                continue;
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'u' => {
                    let hex: String = chars.iter().skip(i + 2).take(4).collect();
                    if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        out.push(ch);
                        i += 6;
                        continue;
                    }
                    out.push('u');
                }
                other => out.push(other),
            }
            i += 2;
            continue;
        }
        if c == quote && closes_string(chars, i + 1) {
            return (out, i + 1);
        }
        out.push(c);
        i += 1;
    }
    (out, i)
}

/// A quote closes its string only when followed by structure or the end.
fn closes_string(chars: &[char], from: usize) -> bool {
    match chars[from.min(chars.len())..].iter().find(|c| !c.is_whitespace()) {
        None => true,
        Some(c) => matches!(c, ':' | ',' | '}' | ']' | '"'),
    }
}

fn read_bare(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    while i < chars.len() && !matches!(chars[i], '{' | '}' | '[' | ']' | ':' | ',' | '"' | '\n') {
        i += 1;
    }
    let word: String = chars[start..i].iter().collect();
    (word.trim().to_string(), i)
}

fn is_json_literal(word: &str) -> bool {
    matches!(word, "true" | "false" | "null") || serde_json::from_str::<serde_json::Number>(word).is_ok()
}

fn quoted(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn closer_for(open: char) -> char {
    if open == '[' {
        ']'
    } else {
        '}'
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Start,
    Open,
    Colon,
    Comma,
    Value,
}

/// Re-emit tokens as compact JSON, fixing separators and closing brackets.
fn assemble(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut open: Vec<char> = Vec::new();
    let mut last = Last::Start;

    for (idx, token) in tokens.iter().enumerate() {
        let is_key = matches!(tokens.get(idx + 1), Some(Token::Colon));
        match token {
            Token::Open(c) => {
                if last == Last::Value {
                    out.push(',');
                }
                out.push(*c);
                open.push(closer_for(*c));
                last = Last::Open;
            }
            Token::Close(c) => {
                match last {
                    Last::Comma => {
                        out.pop();
                    }
                    Last::Colon => out.push_str("\"\""),
                    _ => {}
                }
                if let Some(pos) = open.iter().rposition(|o| o == c) {
                    while open.len() > pos + 1 {
                        if let Some(inner) = open.pop() {
                            out.push(inner);
                        }
                    }
                    open.pop();
                }
                out.push(*c);
                last = Last::Value;
            }
            Token::Colon => {
                if last != Last::Colon {
                    out.push(':');
                    last = Last::Colon;
                }
            }
            Token::Comma => {
                if last == Last::Value {
                    out.push(',');
                    last = Last::Comma;
                }
            }
            Token::Str(s) => {
                if last == Last::Value {
                    out.push(',');
                }
                if is_key {
                    out.push_str(&quoted(&collapse_ws(s)));
                } else {
                    out.push_str(&quoted(s));
                }
                last = Last::Value;
            }
            Token::Bare(word) => {
                if last == Last::Value {
                    out.push(',');
                }
                if is_key {
                    out.push_str(&quoted(&collapse_ws(word)));
                } else if is_json_literal(word) {
                    out.push_str(word);
                } else {
                    out.push_str(&quoted(word));
                }
                last = Last::Value;
            }
        }
    }

    match last {
        Last::Comma => {
            out.pop();
        }
        Last::Colon => out.push_str("\"\""),
        _ => {}
    }
    while let Some(closer) = open.pop() {
        out.push(closer);
    }
    out
}

// ── Stage 3: section mining ──────────────────────────────────────────────

/// Match `"<title>": "<content>"` for each known title directly against the
/// raw text. Content may contain quoted fragments.
pub fn mine_sections(raw: &str, titles: &[String]) -> SectionMapping {
    let mut sections = SectionMapping::new();
    for title in titles {
        let pattern = format!(
            r#""{}"\s*:\s*"([^"]*(?:"[^:]*"[^"]*)*)""#,
            regex::escape(title)
        );
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        if let Some(caps) = re.captures(raw) {
            sections.insert(title.clone(), caps[1].replace("\\\"", "\""));
        }
    }
    sections
}
