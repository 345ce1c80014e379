//! Pipeline stages for field extraction and report generation.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; [`crate::extract`] wires them together and reports progress.
//!
//! ## Data Flow
//!
//! ```text
//! poster:    input ──▶ segment ──▶ preprocess ──▶ ocr ──▶ fields ──▶ dedup
//!                     (bands)     (8 variants)  (ensemble) (heuristics) (title)
//! document:  input ──▶ fields (labelled scan, then heuristics)
//! generate:  prompts ──▶ llm ──▶ repair
//! ```
//!
//! 1. [`input`]     : path/URL to bytes, bytes to image or text
//! 2. [`segment`]   : fixed fractional bands from the template profile
//! 3. [`preprocess`]: grayscale variants of a band, plus highlight cropping
//! 4. [`ocr`]       : variant × mode ensemble behind [`ocr::TextRecognizer`]
//! 5. [`fields`]    : anchor-driven heuristics for the eight event fields
//! 6. [`dedup`]     : collapse repeated words and phrases in the title
//! 7. [`llm`]       : one timed call to the generation backend
//! 8. [`repair`]    : four-stage cascade from raw completion to sections

pub mod dedup;
pub mod fields;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod preprocess;
pub mod repair;
pub mod segment;
#[cfg(feature = "tesseract")]
pub mod tesseract;
