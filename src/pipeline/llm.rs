//! Generation backend: send the report prompt, get raw completion text.
//!
//! The orchestrator only sees the [`CompletionBackend`] trait, so tests and
//! callers with their own transport can supply any implementation. The
//! stock implementation, [`LlmBackend`], wraps an `edgequake-llm` provider.
//! All prompt text lives in [`crate::prompts`].
//!
//! ## No retry
//!
//! A generation call is made exactly once under an explicit timeout. A
//! timeout or provider error ends the request with a transport error; the
//! caller decides whether to resubmit.

use crate::config::ExtractionConfig;
use crate::error::{BackendError, ExtractError};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Source of raw completion text for a system + user prompt pair.
pub trait CompletionBackend: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String, BackendError>>;
}

/// [`CompletionBackend`] over an `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl std::fmt::Debug for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmBackend")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl LlmBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Resolve a provider from `config` and wrap it.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl CompletionBackend for LlmBackend {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
            let options = self.options();
            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| BackendError::Api {
                    message: e.to_string(),
                })?;
            debug!(
                "completion: {} input tokens, {} output tokens",
                response.prompt_tokens, response.completion_tokens
            );
            Ok(response.content)
        })
    }
}

/// Call `backend` once under a `secs` timeout.
///
/// An empty or whitespace-only completion counts as a backend failure.
pub async fn complete_with_timeout(
    backend: &dyn CompletionBackend,
    system: &str,
    user: &str,
    secs: u64,
) -> Result<String, BackendError> {
    let start = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(secs), backend.complete(system, user))
        .await
        .map_err(|_| BackendError::Timeout { secs })?;
    match result {
        Ok(text) if text.trim().is_empty() => Err(BackendError::Api {
            message: "No response received".to_string(),
        }),
        Ok(text) => {
            info!("completion received in {:?} ({} chars)", start.elapsed(), text.len());
            Ok(text)
        }
        Err(e) => {
            warn!("generation backend failed: {}", e);
            Err(e)
        }
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **`OPENAI_API_KEY`** present → OpenAI with the configured model.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
