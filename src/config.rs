//! Configuration types for extraction requests.
//!
//! All request behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. Template-specific data (band fractions,
//! keyword tables, report templates) lives in the embedded
//! [`TemplateProfile`]; everything else is an engine or transport knob.

use crate::error::ExtractError;
use crate::profile::TemplateProfile;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for an extraction or generation request.
///
/// # Example
/// ```rust
/// use eventdoc_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .language("eng")
///     .max_alternate_modes(2)
///     .generation_timeout_secs(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_alternate_modes, 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Recogniser language tag. Default: "eng".
    pub language: String,

    /// Alternate page-segmentation modes tried after a band's primary mode.
    /// Range: 0–3. Default: 3.
    pub max_alternate_modes: usize,

    /// Candidates kept per band for diagnostics. Default: 5.
    pub top_candidates: usize,

    /// Candidates joined into a band's `combined_text`. Default: 3.
    pub combined_candidates: usize,

    /// Bands shorter than this many pixels are upscaled 2× before
    /// preprocessing. Default: 96.
    pub min_band_height: u32,

    /// Evaluate the variant × mode cross product on the rayon pool. Default: true.
    pub parallel_ocr: bool,

    /// Generation backend timeout in one-shot mode, seconds. Default: 30.
    pub generation_timeout_secs: u64,

    /// Generation backend timeout in streaming mode, seconds. Default: 60.
    pub stream_generation_timeout_secs: u64,

    /// Sampling temperature for report generation. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens generated per report. Default: 3000.
    pub max_tokens: usize,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Characters of the raw completion kept in the terminal fallback
    /// section. Default: 1000.
    pub fallback_excerpt_chars: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Template data for posters and reports.
    pub profile: TemplateProfile,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            max_alternate_modes: 3,
            top_candidates: 5,
            combined_candidates: 3,
            min_band_height: 96,
            parallel_ocr: true,
            generation_timeout_secs: 30,
            stream_generation_timeout_secs: 60,
            temperature: 0.7,
            max_tokens: 3000,
            model: None,
            provider_name: None,
            provider: None,
            fallback_excerpt_chars: 1000,
            download_timeout_secs: 120,
            profile: TemplateProfile::default(),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("language", &self.language)
            .field("max_alternate_modes", &self.max_alternate_modes)
            .field("top_candidates", &self.top_candidates)
            .field("combined_candidates", &self.combined_candidates)
            .field("min_band_height", &self.min_band_height)
            .field("parallel_ocr", &self.parallel_ocr)
            .field("generation_timeout_secs", &self.generation_timeout_secs)
            .field("stream_generation_timeout_secs", &self.stream_generation_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("profile", &self.profile.name)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Backend timeout for the given mode.
    pub fn generation_timeout(&self, streaming: bool) -> u64 {
        if streaming {
            self.stream_generation_timeout_secs
        } else {
            self.generation_timeout_secs
        }
    }

    /// Check the constraints the builder enforces.
    ///
    /// Fields are public, so a config assembled by hand is re-checked here
    /// before any request uses it.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.language.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Recogniser language must not be empty".into(),
            ));
        }
        if self.top_candidates == 0 || self.combined_candidates == 0 {
            return Err(ExtractError::InvalidConfig(
                "top_candidates and combined_candidates must be ≥ 1".into(),
            ));
        }
        if self.combined_candidates > self.top_candidates {
            return Err(ExtractError::InvalidConfig(format!(
                "combined_candidates ({}) cannot exceed top_candidates ({})",
                self.combined_candidates, self.top_candidates
            )));
        }
        if self.generation_timeout_secs == 0 || self.stream_generation_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "Generation timeouts must be ≥ 1 second".into(),
            ));
        }
        self.profile.validate()
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn max_alternate_modes(mut self, n: usize) -> Self {
        self.config.max_alternate_modes = n.min(3);
        self
    }

    pub fn top_candidates(mut self, n: usize) -> Self {
        self.config.top_candidates = n.max(1);
        self
    }

    pub fn combined_candidates(mut self, n: usize) -> Self {
        self.config.combined_candidates = n.max(1);
        self
    }

    pub fn min_band_height(mut self, px: u32) -> Self {
        self.config.min_band_height = px;
        self
    }

    pub fn parallel_ocr(mut self, v: bool) -> Self {
        self.config.parallel_ocr = v;
        self
    }

    pub fn generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation_timeout_secs = secs;
        self
    }

    pub fn stream_generation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stream_generation_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn fallback_excerpt_chars(mut self, n: usize) -> Self {
        self.config.fallback_excerpt_chars = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn profile(mut self, profile: TemplateProfile) -> Self {
        self.config.profile = profile;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.language, "eng");
        assert_eq!(c.max_alternate_modes, 3);
        assert_eq!(c.top_candidates, 5);
        assert_eq!(c.combined_candidates, 3);
        assert_eq!(c.generation_timeout(false), 30);
        assert_eq!(c.generation_timeout(true), 60);
    }

    #[test]
    fn alternate_modes_clamped() {
        let c = ExtractionConfig::builder()
            .max_alternate_modes(9)
            .build()
            .unwrap();
        assert_eq!(c.max_alternate_modes, 3);
    }

    #[test]
    fn combined_above_top_rejected() {
        let err = ExtractionConfig::builder()
            .top_candidates(2)
            .combined_candidates(3)
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(ExtractionConfig::builder()
            .generation_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn invalid_profile_rejected_by_builder() {
        let mut profile = TemplateProfile::default();
        profile.bands.clear();
        let err = ExtractionConfig::builder().profile(profile).build().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidProfile(_)));
    }

    #[test]
    fn hand_built_config_rechecked() {
        let c = ExtractionConfig {
            top_candidates: 0,
            combined_candidates: 0,
            ..ExtractionConfig::default()
        };
        assert!(matches!(c.validate(), Err(ExtractError::InvalidConfig(_))));
        assert!(ExtractionConfig::default().validate().is_ok());
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", ExtractionConfig::default());
        assert!(s.contains("ExtractionConfig"));
        assert!(s.contains("default"));
    }
}
