//! Region segmentation: cut a poster into its fixed template bands.
//!
//! The layout is known in advance, so segmentation is pure arithmetic on the
//! band fractions of the active [`TemplateProfile`]. Row boundaries are
//! `floor(height × fraction)`; the last band always runs to the bottom row so
//! rounding never drops pixels.

use crate::error::ExtractError;
use crate::model::{Band, RegionSet};
use crate::profile::TemplateProfile;
use image::{imageops, DynamicImage};
use tracing::debug;

/// Split `image` into the profile's bands, top to bottom.
///
/// Bands that round to zero rows are skipped. Fails only on an image with a
/// zero dimension.
pub fn segment(image: &DynamicImage, profile: &TemplateProfile) -> Result<RegionSet, ExtractError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(ExtractError::EmptyImage { width, height });
    }

    let last = profile.bands.len().saturating_sub(1);
    let mut bands = Vec::with_capacity(profile.bands.len());
    for (idx, spec) in profile.bands.iter().enumerate() {
        let top = row(height, spec.start);
        let bottom = if idx == last { height } else { row(height, spec.end) };
        if bottom <= top {
            debug!("band {} is empty at height {}; skipped", spec.name, height);
            continue;
        }
        let image = imageops::crop_imm(&rgb, 0, top, width, bottom - top).to_image();
        debug!("band {}: rows {}..{}", spec.name, top, bottom);
        bands.push(Band {
            name: spec.name,
            top,
            bottom,
            psm: spec.psm,
            image,
        });
    }
    Ok(RegionSet { bands })
}

/// Fractions are stored as `f32`; the epsilon keeps `0.35 × 1000` at 350.
fn row(height: u32, fraction: f32) -> u32 {
    ((height as f64 * fraction as f64 + 1e-4).floor() as u32).min(height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BandName;
    use image::{Rgb, RgbImage};

    fn blank(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    #[test]
    fn six_bands_cover_every_row_once() {
        let regions = segment(&blank(300, 1000), &TemplateProfile::default()).unwrap();
        assert_eq!(regions.len(), 6);
        let mut expected_top = 0;
        for band in &regions.bands {
            assert_eq!(band.top, expected_top);
            assert_eq!(band.image.height(), band.bottom - band.top);
            expected_top = band.bottom;
        }
        assert_eq!(expected_top, 1000);
    }

    #[test]
    fn band_rows_follow_fractions() {
        let regions = segment(&blank(10, 1000), &TemplateProfile::default()).unwrap();
        let title = regions.get(BandName::Title).unwrap();
        assert_eq!((title.top, title.bottom), (350, 550));
    }

    #[test]
    fn odd_heights_keep_last_row() {
        let regions = segment(&blank(10, 997), &TemplateProfile::default()).unwrap();
        assert_eq!(regions.get(BandName::Footer).unwrap().bottom, 997);
    }

    #[test]
    fn tiny_images_skip_empty_bands() {
        let regions = segment(&blank(5, 3), &TemplateProfile::default()).unwrap();
        assert!(!regions.is_empty());
        assert!(regions.bands.iter().all(|b| b.bottom > b.top));
    }

    #[test]
    fn zero_sized_image_rejected() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = segment(&empty, &TemplateProfile::default()).unwrap_err();
        assert!(matches!(err, ExtractError::EmptyImage { .. }));
    }
}
