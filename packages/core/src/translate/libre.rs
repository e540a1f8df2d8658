//! LibreTranslate-compatible HTTP backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::TranslationError;
use crate::translate::Translator;

#[derive(Clone)]
pub struct LibreTranslator {
    base_url: String,
    target: String,
    api_key: Option<String>,
    http: Client,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl LibreTranslator {
    pub fn new(base_url: String, target: String, api_key: Option<String>, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            target,
            api_key,
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Translator for LibreTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let url = format!("{}/translate", self.base_url);
        let request = TranslateRequest {
            q: text,
            source: "auto",
            target: &self.target,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.http.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(TranslationError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: TranslateResponse = response.json().await?;
        let translated = body.translated_text.trim();

        if translated.is_empty() {
            return Err(TranslationError::Malformed {
                message: "empty translatedText".to_string(),
            });
        }

        Ok(translated.to_string())
    }

    fn backend_name(&self) -> &str {
        "libretranslate"
    }
}
