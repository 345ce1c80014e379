//! Tesseract-backed [`TextRecognizer`] (feature `tesseract`).
//!
//! A fresh `LepTess` handle is created per call: Tesseract handles are not
//! `Sync`, and the ensemble engine calls the recogniser from many rayon
//! threads at once. Initialisation costs a few milliseconds, small next to
//! recognition itself.

use crate::error::RecognitionError;
use crate::model::PageSegMode;
use crate::pipeline::ocr::TextRecognizer;
use image::GrayImage;
use leptess::{LepTess, Variable};
use std::io::Cursor;
use tracing::debug;

/// Recogniser that shells out to the system Tesseract via leptess.
#[derive(Debug, Clone, Default)]
pub struct TesseractRecognizer {
    /// Directory holding `*.traineddata`; `None` uses Tesseract's default.
    pub datapath: Option<String>,
}

impl TesseractRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_datapath(datapath: impl Into<String>) -> Self {
        Self {
            datapath: Some(datapath.into()),
        }
    }

    /// Check that Tesseract initialises for `language`.
    pub fn probe(&self, language: &str) -> Result<(), RecognitionError> {
        LepTess::new(self.datapath.as_deref(), language)
            .map(|_| ())
            .map_err(|e| RecognitionError::Init(e.to_string()))
    }
}

/// PNG-encode a band; leptess only reads encoded images from memory.
fn encode_png(image: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(buf.into_inner())
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(
        &self,
        image: &GrayImage,
        psm: PageSegMode,
        language: &str,
    ) -> Result<String, RecognitionError> {
        let mut lt = LepTess::new(self.datapath.as_deref(), language)
            .map_err(|e| RecognitionError::Init(e.to_string()))?;
        lt.set_variable(Variable::TesseditPagesegMode, &psm.as_tesseract().to_string())
            .map_err(|e| RecognitionError::Init(format!("psm {}: {e}", psm.as_tesseract())))?;

        let png = encode_png(image).map_err(|e| RecognitionError::Image(e.to_string()))?;
        lt.set_image_from_mem(&png)
            .map_err(|e| RecognitionError::Image(e.to_string()))?;
        lt.set_source_resolution(300);

        let text = lt
            .get_utf8_text()
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        debug!("tesseract psm {}: {} chars", psm.as_tesseract(), text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn encodes_png_signature() {
        let img = GrayImage::from_pixel(10, 10, Luma([255]));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[..4], b"\x89PNG");
    }
}
