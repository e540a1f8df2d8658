//! Translation backends and the best-effort adapter the pipeline uses.
//!
//! A backend may fail; the adapter never does. Any backend error, timeout,
//! or input that needs no translation yields the original text.

pub mod dictionary;
pub mod libre;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TranslationError;

pub use dictionary::DictionaryTranslator;
pub use libre::LibreTranslator;

/// Text-in/text-out translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;

    fn backend_name(&self) -> &str;
}

/// Identity backend, used when translation is disabled.
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }

    fn backend_name(&self) -> &str {
        "none"
    }
}

/// Outcome of [`TranslatorAdapter::translate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    /// The backend produced text.
    Translated(String),
    /// Nothing to translate (no Latin letters in the input).
    Skipped,
    /// The backend failed or timed out; the original text stands.
    Fallback,
}

impl Translation {
    /// The text to show for `original`.
    pub fn text_or<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            Self::Translated(text) => text,
            Self::Skipped | Self::Fallback => original,
        }
    }
}

/// Wraps a backend with a single bounded attempt and passthrough on failure.
#[derive(Clone)]
pub struct TranslatorAdapter {
    backend: Arc<dyn Translator>,
    timeout: Duration,
}

impl TranslatorAdapter {
    pub fn new(backend: Arc<dyn Translator>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    pub async fn translate(&self, text: &str) -> Translation {
        if !needs_translation(text) {
            return Translation::Skipped;
        }

        let attempt = tokio::time::timeout(self.timeout, self.backend.translate(text)).await;

        match attempt {
            Ok(Ok(translated)) => Translation::Translated(translated),
            Ok(Err(err)) => {
                tracing::warn!(
                    "{} translation failed, using original text: {}",
                    self.backend.backend_name(),
                    err
                );
                Translation::Fallback
            }
            Err(_) => {
                tracing::warn!(
                    "{} translation timed out after {:?}, using original text",
                    self.backend.backend_name(),
                    self.timeout
                );
                Translation::Fallback
            }
        }
    }
}

/// Only text containing Latin letters is sent to a backend.
pub fn needs_translation(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}
