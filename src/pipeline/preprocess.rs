//! Image preprocessing: one band in, eight recogniser-ready variants out.
//!
//! Poster bands mix photographs, coloured banners, outlined display fonts
//! and small print. No single binarisation works for all of them, so the
//! ensemble engine recognises every band under each [`Variant`] and keeps
//! whichever reads best.
//!
//! All variants are deterministic pure functions of the grayscale band.
//! Bands shorter than the configured minimum are upscaled 2× first, since
//! Tesseract's accuracy drops sharply below ~20 px glyph height.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::contrast::{self, ThresholdType};
use imageproc::{filter, map, morphology};
use serde::Serialize;
use tracing::debug;

/// One preprocessing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Contrast-limited adaptive histogram equalisation.
    Clahe,
    /// CLAHE followed by a 3×3 median filter.
    ClaheDenoise,
    /// Median filter followed by a global contrast stretch.
    DenoiseContrast,
    /// Global Otsu binarisation.
    Otsu,
    /// Gaussian-weighted local-mean threshold.
    AdaptiveGaussian,
    /// Otsu, then a 1 px opening to drop speckle.
    Morphological,
    /// Unsharp mask.
    Sharpen,
    /// Edge-preserving bilateral smoothing.
    Bilateral,
}

impl Variant {
    pub const ALL: [Variant; 8] = [
        Variant::Clahe,
        Variant::ClaheDenoise,
        Variant::DenoiseContrast,
        Variant::Otsu,
        Variant::AdaptiveGaussian,
        Variant::Morphological,
        Variant::Sharpen,
        Variant::Bilateral,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Variant::Clahe => "clahe",
            Variant::ClaheDenoise => "clahe_denoise",
            Variant::DenoiseContrast => "denoise_contrast",
            Variant::Otsu => "otsu",
            Variant::AdaptiveGaussian => "adaptive_gaussian",
            Variant::Morphological => "morphological",
            Variant::Sharpen => "sharpen",
            Variant::Bilateral => "bilateral",
        }
    }

    /// Produce this variant from a grayscale band.
    pub fn apply(self, gray: &GrayImage) -> GrayImage {
        match self {
            Variant::Clahe => clahe(gray, CLAHE_TILES, CLAHE_CLIP),
            Variant::ClaheDenoise => filter::median_filter(&clahe(gray, CLAHE_TILES, CLAHE_CLIP), 1, 1),
            Variant::DenoiseContrast => imageops::contrast(&filter::median_filter(gray, 1, 1), 40.0),
            Variant::Otsu => otsu(gray),
            Variant::AdaptiveGaussian => adaptive_gaussian(gray, 2.0, 2),
            Variant::Morphological => {
                let binary = otsu(gray);
                morphology::dilate(&morphology::erode(&binary, Norm::LInf, 1), Norm::LInf, 1)
            }
            Variant::Sharpen => filter::sharpen_gaussian(gray, 1.0, 0.5),
            Variant::Bilateral => bilateral(gray, 4, 75.0, 75.0),
        }
    }
}

const CLAHE_TILES: u32 = 8;
const CLAHE_CLIP: f32 = 2.0;

/// Grayscale a band, upscaling 2× when it is shorter than `min_height`.
pub fn to_gray(band: &RgbImage, min_height: u32) -> GrayImage {
    let gray = imageops::grayscale(band);
    let (w, h) = gray.dimensions();
    if h > 0 && h < min_height {
        debug!("upscaling {}x{} band 2×", w, h);
        imageops::resize(&gray, w * 2, h * 2, FilterType::CatmullRom)
    } else {
        gray
    }
}

/// All eight variants of one grayscale band, in [`Variant::ALL`] order.
pub fn variants(gray: &GrayImage) -> Vec<(Variant, GrayImage)> {
    Variant::ALL.iter().map(|&v| (v, v.apply(gray))).collect()
}

// ── Thresholding ─────────────────────────────────────────────────────────

fn otsu(gray: &GrayImage) -> GrayImage {
    contrast::threshold(gray, contrast::otsu_level(gray), ThresholdType::Binary)
}

/// Local threshold against a Gaussian-weighted neighbourhood mean minus `c`.
fn adaptive_gaussian(gray: &GrayImage, sigma: f32, c: i16) -> GrayImage {
    let local = filter::gaussian_blur_f32(gray, sigma);
    map::map_colors2(gray, &local, |p, m| {
        Luma([if p[0] as i16 > m[0] as i16 - c { 255 } else { 0 }])
    })
}

// ── Filters ──────────────────────────────────────────────────────────────

/// Edge-preserving smoothing over a `(2r+1)²` window.
fn bilateral(gray: &GrayImage, radius: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    filter::bilateral_filter(gray, 2 * radius + 1, sigma_color, sigma_space)
}

// ── CLAHE ────────────────────────────────────────────────────────────────

/// Contrast-limited adaptive histogram equalisation with bilinear blending
/// between tile mappings.
fn clahe(gray: &GrayImage, tiles: u32, clip: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tile_w = w.div_ceil(tiles.min(w));
    let tile_h = h.div_ceil(tiles.min(h));
    let tx = w.div_ceil(tile_w);
    let ty = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tx * ty) as usize);
    for j in 0..ty {
        for i in 0..tx {
            let x0 = i * tile_w;
            let y0 = j * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(gray, x0, y0, x1, y1, clip));
        }
    }

    let lut_at = |i: u32, j: u32| &luts[(j * tx + i) as usize];
    GrayImage::from_fn(w, h, |x, y| {
        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let i0 = fx.floor().clamp(0.0, (tx - 1) as f32);
        let j0 = fy.floor().clamp(0.0, (ty - 1) as f32);
        let ax = (fx - i0).clamp(0.0, 1.0);
        let ay = (fy - j0).clamp(0.0, 1.0);
        let (i0, j0) = (i0 as u32, j0 as u32);
        let i1 = (i0 + 1).min(tx - 1);
        let j1 = (j0 + 1).min(ty - 1);

        let p = gray.get_pixel(x, y)[0] as usize;
        let top = lut_at(i0, j0)[p] as f32 * (1.0 - ax) + lut_at(i1, j0)[p] as f32 * ax;
        let bottom = lut_at(i0, j1)[p] as f32 * (1.0 - ax) + lut_at(i1, j1)[p] as f32 * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Clipped, redistributed histogram equalisation mapping for one tile.
fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }
    let count: u32 = hist.iter().sum();
    let mut lut = [0u8; 256];
    if count == 0 {
        for (v, slot) in lut.iter_mut().enumerate() {
            *slot = v as u8;
        }
        return lut;
    }

    let limit = ((clip * count as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (k, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(k < remainder);
    }

    let mut cdf = 0u32;
    for (k, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[k] = ((cdf as f32 * 255.0) / count as f32).round().min(255.0) as u8;
    }
    lut
}

// ── Highlight region ─────────────────────────────────────────────────────

/// Minimum share of a band's pixels that must be saturated before a
/// highlight is assumed.
const MIN_HIGHLIGHT_SHARE: f32 = 0.02;

/// Bounding box of strongly coloured pixels, cropped out of `band`.
///
/// Department names are often printed on a coloured ribbon the plain
/// band OCR misses; the field extractor re-recognises this crop as a last
/// resort.
pub fn highlight_region(band: &RgbImage) -> Option<RgbImage> {
    let (w, h) = band.dimensions();
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (u32::MAX, u32::MAX, 0u32, 0u32);
    let mut hits = 0usize;
    for (x, y, px) in band.enumerate_pixels() {
        let [r, g, b] = px.0;
        let hi = r.max(g).max(b);
        let lo = r.min(g).min(b);
        if hi > 100 && hi - lo > 80 {
            hits += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if hits == 0 || (hits as f32) < MIN_HIGHLIGHT_SHARE * (w * h) as f32 {
        return None;
    }
    debug!(
        "highlight region {}x{} at ({}, {})",
        max_x - min_x + 1,
        max_y - min_y + 1,
        min_x,
        min_y
    );
    Some(imageops::crop_imm(band, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image())
}
