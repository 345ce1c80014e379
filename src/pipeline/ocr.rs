//! OCR ensemble engine: many readings of one band, ranked by plausibility.
//!
//! For each band the engine runs the recogniser over the cross product of
//! the eight preprocessing [`Variant`]s and a short list of page-segmentation
//! modes (the band's primary mode, then up to three alternates). Each
//! non-blank reading becomes an [`OcrCandidate`] scored by [`score_text`];
//! the ranked list collapses into a [`BandResult`].
//!
//! ## Determinism
//!
//! Combinations are independent, so they run on the rayon pool when
//! `parallel` is set. Results are collected in combination order and ranked
//! with a stable sort, so the output is identical whichever thread finishes
//! first.
//!
//! ## Failure
//!
//! A failing recogniser call is a [`RecognitionError`], logged at `debug`
//! and treated as a blank reading. A band where nothing survives yields
//! [`BandResult::empty`]; the engine itself never fails.

use crate::config::ExtractionConfig;
use crate::error::RecognitionError;
use crate::model::{Band, BandName, BandResult, OcrCandidate, PageSegMode};
use crate::pipeline::preprocess::{self, Variant};
use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, trace};

/// The external text-recognition capability: image + mode → text.
///
/// Implementations must be callable from several threads at once.
pub trait TextRecognizer: Send + Sync {
    fn recognize(
        &self,
        image: &GrayImage,
        psm: PageSegMode,
        language: &str,
    ) -> Result<String, RecognitionError>;
}

/// Engine knobs, taken from [`ExtractionConfig`].
#[derive(Debug, Clone)]
pub struct EnsembleOptions {
    pub language: String,
    pub max_alternate_modes: usize,
    pub top_candidates: usize,
    pub combined_candidates: usize,
    pub min_band_height: u32,
    pub parallel: bool,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for EnsembleOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            language: config.language.clone(),
            max_alternate_modes: config.max_alternate_modes,
            top_candidates: config.top_candidates,
            combined_candidates: config.combined_candidates,
            min_band_height: config.min_band_height,
            parallel: config.parallel_ocr,
        }
    }
}

/// Primary mode first, then distinct alternates, at most `1 + max_alternates`.
pub fn modes_for(primary: PageSegMode, max_alternates: usize) -> Vec<PageSegMode> {
    let mut modes = vec![primary];
    modes.extend(
        PageSegMode::ALTERNATES
            .iter()
            .copied()
            .filter(|m| *m != primary)
            .take(max_alternates),
    );
    modes
}

/// Heuristic text quality in `[0, 1]`.
///
/// `(word_length_score + alpha_ratio) / 2`, where the word-length score is
/// 1.0 when the mean token length lies in `[4, 12]` and 0.5 otherwise, and
/// the alpha ratio is the share of alphabetic characters among non-blank
/// characters. Blank text scores 0.
pub fn score_text(text: &str) -> f32 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let total_chars: usize = tokens.iter().map(|t| t.chars().count()).sum();
    let mean_len = total_chars as f32 / tokens.len() as f32;
    let word_score = if (4.0..=12.0).contains(&mean_len) { 1.0 } else { 0.5 };
    let alpha = tokens
        .iter()
        .flat_map(|t| t.chars())
        .filter(|c| c.is_alphabetic())
        .count();
    let alpha_ratio = alpha as f32 / total_chars as f32;
    (word_score + alpha_ratio) / 2.0
}

/// Recognise one band under every variant × mode combination and rank.
pub fn recognize_band(recognizer: &dyn TextRecognizer, band: &Band, opts: &EnsembleOptions) -> BandResult {
    let gray = preprocess::to_gray(&band.image, opts.min_band_height);
    let candidates = recognize_gray(recognizer, &gray, band.psm, opts);
    let result = rank(band.name, candidates, opts);
    debug!(
        "band {}: confidence {:.2}, {} candidate(s) kept",
        band.name,
        result.confidence,
        result.top_candidates.len()
    );
    result
}

/// Candidates for an already-grayscale image, in combination order.
pub fn recognize_gray(
    recognizer: &dyn TextRecognizer,
    gray: &GrayImage,
    primary: PageSegMode,
    opts: &EnsembleOptions,
) -> Vec<OcrCandidate> {
    let modes = modes_for(primary, opts.max_alternate_modes);
    let images: Vec<(Variant, GrayImage)> = if opts.parallel {
        Variant::ALL.par_iter().map(|&v| (v, v.apply(gray))).collect()
    } else {
        preprocess::variants(gray)
    };

    let combos: Vec<(usize, PageSegMode)> = (0..images.len())
        .flat_map(|i| modes.iter().map(move |&m| (i, m)))
        .collect();

    let run = |&(i, psm): &(usize, PageSegMode)| {
        let (variant, image) = &images[i];
        read_one(recognizer, image, *variant, psm, &opts.language)
    };
    let readings: Vec<Option<OcrCandidate>> = if opts.parallel {
        combos.par_iter().map(run).collect()
    } else {
        combos.iter().map(run).collect()
    };
    readings.into_iter().flatten().collect()
}

fn read_one(
    recognizer: &dyn TextRecognizer,
    image: &GrayImage,
    variant: Variant,
    psm: PageSegMode,
    language: &str,
) -> Option<OcrCandidate> {
    match recognizer.recognize(image, psm, language) {
        Ok(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                trace!("{} / psm {}: blank", variant.id(), psm.as_tesseract());
                return None;
            }
            let confidence = score_text(&text);
            Some(OcrCandidate {
                text,
                confidence,
                variant,
                psm,
            })
        }
        Err(e) => {
            debug!("{} / psm {}: {}", variant.id(), psm.as_tesseract(), e);
            None
        }
    }
}

/// Stable rank by confidence, then collapse into a [`BandResult`].
pub fn rank(band: BandName, mut candidates: Vec<OcrCandidate>, opts: &EnsembleOptions) -> BandResult {
    if candidates.is_empty() {
        return BandResult::empty(band);
    }
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let combined_text = candidates
        .iter()
        .take(opts.combined_candidates)
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    candidates.truncate(opts.top_candidates.max(1));
    let Some(best) = candidates.first() else {
        return BandResult::empty(band);
    };
    BandResult {
        band,
        best_text: best.text.clone(),
        combined_text,
        confidence: best.confidence,
        top_candidates: candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed text per mode; fails for SparseText.
    struct ByMode;

    impl TextRecognizer for ByMode {
        fn recognize(&self, _: &GrayImage, psm: PageSegMode, _: &str) -> Result<String, RecognitionError> {
            match psm {
                PageSegMode::SingleBlock => Ok("GUEST LECTURE".into()),
                PageSegMode::Auto => Ok("G#3 1~ 7".into()),
                PageSegMode::SingleColumn => Ok("   ".into()),
                PageSegMode::SingleLine => Ok("Machine Learning".into()),
                PageSegMode::SparseText => Err(RecognitionError::Engine("boom".into())),
            }
        }
    }

    struct Counting(AtomicUsize);

    impl TextRecognizer for Counting {
        fn recognize(&self, _: &GrayImage, _: PageSegMode, _: &str) -> Result<String, RecognitionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("same text".into())
        }
    }

    fn band(psm: PageSegMode) -> Band {
        Band {
            name: BandName::Title,
            top: 0,
            bottom: 40,
            psm,
            image: RgbImage::from_pixel(60, 40, Rgb([255, 255, 255])),
        }
    }

    fn candidate(text: &str, confidence: f32) -> OcrCandidate {
        OcrCandidate {
            text: text.into(),
            confidence,
            variant: Variant::Otsu,
            psm: PageSegMode::Auto,
        }
    }

    #[test]
    fn score_prefers_alphabetic_text() {
        // Equal word-length scores; alpha ratio decides.
        let clean = score_text("ROBOTICS WORKSHOP");
        let noisy = score_text("R0B0T1C5 W0RK5H0P");
        assert!(clean > noisy);
        assert!((clean - 1.0).abs() < 1e-6);
        assert_eq!(score_text("   "), 0.0);
    }

    #[test]
    fn score_penalises_implausible_word_lengths() {
        assert!((score_text("a b c d") - 0.75).abs() < 1e-6);
    }

    #[test]
    fn higher_alpha_ratio_ranks_first() {
        let opts = EnsembleOptions::default();
        let result = rank(
            BandName::Title,
            vec![candidate("low", 0.3 + 0.5), candidate("high", 0.9 + 0.5)],
            &opts,
        );
        assert_eq!(result.best_text, "high");
    }

    #[test]
    fn ties_keep_combination_order() {
        let opts = EnsembleOptions::default();
        let result = rank(
            BandName::Title,
            vec![candidate("first", 0.8), candidate("second", 0.8), candidate("third", 0.8)],
            &opts,
        );
        assert_eq!(result.best_text, "first");
        assert_eq!(result.combined_text, "first\nsecond\nthird");
    }

    #[test]
    fn empty_band_is_not_an_error() {
        let result = rank(BandName::Footer, Vec::new(), &EnsembleOptions::default());
        assert_eq!(result, BandResult::empty(BandName::Footer));
    }

    #[test]
    fn zero_top_candidates_keeps_the_best() {
        let opts = EnsembleOptions {
            top_candidates: 0,
            combined_candidates: 0,
            ..EnsembleOptions::default()
        };
        let result = rank(BandName::Title, vec![candidate("only", 0.7)], &opts);
        assert_eq!(result.best_text, "only");
        assert_eq!(result.top_candidates.len(), 1);
        assert!(result.combined_text.is_empty());
    }

    #[test]
    fn modes_are_distinct_and_bounded() {
        assert_eq!(
            modes_for(PageSegMode::SingleBlock, 3),
            vec![PageSegMode::SingleBlock, PageSegMode::Auto, PageSegMode::SingleColumn]
        );
        assert_eq!(modes_for(PageSegMode::SparseText, 3).len(), 4);
        assert_eq!(modes_for(PageSegMode::SparseText, 0), vec![PageSegMode::SparseText]);
    }

    #[test]
    fn blanks_and_errors_are_discarded() {
        let opts = EnsembleOptions::default();
        let result = recognize_band(&ByMode, &band(PageSegMode::SparseText), &opts);
        assert_eq!(result.best_text, "GUEST LECTURE");
        assert!(result.top_candidates.iter().all(|c| !c.text.trim().is_empty()));
        assert!(result.top_candidates.len() <= opts.top_candidates);
        assert_eq!(result.combined_text.lines().count(), 3);
    }

    #[test]
    fn cross_product_size() {
        let counter = Counting(AtomicUsize::new(0));
        let opts = EnsembleOptions {
            max_alternate_modes: 1,
            ..EnsembleOptions::default()
        };
        recognize_band(&counter, &band(PageSegMode::Auto), &opts);
        assert_eq!(counter.0.load(Ordering::SeqCst), Variant::ALL.len() * 2);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let par = EnsembleOptions::default();
        let seq = EnsembleOptions {
            parallel: false,
            ..EnsembleOptions::default()
        };
        let a = recognize_band(&ByMode, &band(PageSegMode::SingleLine), &par);
        let b = recognize_band(&ByMode, &band(PageSegMode::SingleLine), &seq);
        assert_eq!(a, b);
    }
}
