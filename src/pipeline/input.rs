//! Input resolution and classification.
//!
//! A request names its input as a local path or an `http(s)` URL.
//! [`resolve_input`] turns either into bytes; [`classify`] decides what the
//! bytes are:
//!
//! | Content                         | Result                |
//! |---------------------------------|-----------------------|
//! | PNG / JPEG (by signature)       | `RawSource::Image`    |
//! | `%PDF` magic                    | `RawSource::Text` via pdf-extract |
//! | `%PDF` that pdf-extract rejects | `InputInvalid`        |
//! | valid UTF-8                     | `RawSource::Text`     |
//! | anything else                   | `UnsupportedInput`    |
//!
//! Classification is by content, never by file extension. It is CPU-bound
//! (image decode, PDF parsing); async callers run it on a blocking thread.

use crate::error::ExtractError;
use crate::model::RawSource;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL into memory.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ExtractError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractError::PermissionDenied { path })
        }
        Err(_) => Err(ExtractError::FileNotFound { path }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ExtractError> {
    info!("downloading input from {}", url);
    let failed = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}

/// Decide whether `bytes` are a poster image or flat document text.
pub fn classify(bytes: &[u8]) -> Result<RawSource, ExtractError> {
    if bytes.is_empty() {
        return Err(ExtractError::UnsupportedInput {
            detail: "input is empty".to_string(),
        });
    }

    if let Ok(format) = image::guess_format(bytes) {
        debug!("input classified as {:?} image", format);
        return decode_image(bytes).map(RawSource::Image);
    }

    if bytes.starts_with(b"%PDF") {
        return pdf_text(bytes).map(RawSource::Text);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(RawSource::Text(text.to_string())),
        Err(_) => Err(ExtractError::UnsupportedInput {
            detail: format!("unrecognised content ({} bytes, not an image, PDF or UTF-8 text)", bytes.len()),
        }),
    }
}

/// Extract the text layer of a PDF.
///
/// pdf-extract panics on a range of well-formed but unusual documents
/// (missing font resources, Type3 fonts, unknown encodings), so the call is
/// isolated and a panic becomes [`ExtractError::InputInvalid`].
fn pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));
    match result {
        Ok(Ok(text)) => {
            debug!("extracted {} chars from PDF", text.len());
            Ok(text)
        }
        Ok(Err(e)) => Err(ExtractError::InputInvalid {
            detail: format!("PDF text could not be extracted: {e}"),
        }),
        Err(_) => {
            warn!("pdf-extract panicked on a {} byte document", bytes.len());
            Err(ExtractError::InputInvalid {
                detail: "PDF structure is not supported by the text extractor".to_string(),
            })
        }
    }
}

/// Decode image bytes, rejecting zero-sized images.
pub fn decode_image(bytes: &[u8]) -> Result<image::DynamicImage, ExtractError> {
    let image = image::load_from_memory(bytes).map_err(|e| ExtractError::ImageDecode {
        detail: e.to_string(),
    })?;
    if image.width() == 0 || image.height() == 0 {
        return Err(ExtractError::EmptyImage {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image)
}
