//! HTTP translation backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use transq_core::config::env_or;
use transq_core::{defaults, Error, Result, TranslationClient};

use super::error::{to_transq_error, ServiceErrorCode};
use super::language::backend_language_code;

/// Configuration for the HTTP translation backend.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Full URL of the translate endpoint.
    pub endpoint: String,
    /// Bearer token (optional for local endpoints).
    pub api_key: Option<String>,
    /// TCP connect timeout in seconds. The per-request deadline is enforced
    /// by the caller.
    pub connect_timeout_secs: u64,
    /// `max_length` hint forwarded to the service.
    pub max_length: u32,
    /// Rewrite ISO 639-1 tags into the service's language codes.
    pub map_language_codes: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::TRANSLATION_API_URL.to_string(),
            api_key: None,
            connect_timeout_secs: defaults::TRANSLATION_CONNECT_TIMEOUT_SECS,
            max_length: defaults::TRANSLATION_MAX_LENGTH,
            map_language_codes: true,
        }
    }
}

impl HttpClientConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TRANSLATION_API_URL` | `http://127.0.0.1:8080/api/v4/translator` | Translate endpoint |
    /// | `TRANSLATION_API_KEY` | unset | Bearer token |
    /// | `TRANSLATION_CONNECT_TIMEOUT_SECS` | `10` | Connect timeout |
    /// | `TRANSLATION_MAX_LENGTH` | `1000` | Output length hint |
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("TRANSLATION_API_URL")
                .unwrap_or_else(|_| defaults::TRANSLATION_API_URL.to_string()),
            api_key: std::env::var("TRANSLATION_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            connect_timeout_secs: env_or(
                "TRANSLATION_CONNECT_TIMEOUT_SECS",
                defaults::TRANSLATION_CONNECT_TIMEOUT_SECS,
            ),
            max_length: env_or("TRANSLATION_MAX_LENGTH", defaults::TRANSLATION_MAX_LENGTH),
            map_language_codes: true,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_language_mapping(mut self, enabled: bool) -> Self {
        self.map_language_codes = enabled;
        self
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source: &'a str,
    target: &'a str,
    max_length: u32,
}

/// Service response. Deployments disagree on the field name.
#[derive(Debug, Default, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    translated_text: Option<String>,
    #[serde(default, rename = "translatedText")]
    translated_text_camel: Option<String>,
    #[serde(default)]
    translation: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl TranslateResponse {
    fn into_translation(self) -> Result<String> {
        if let Some(message) = self.error.as_ref().and_then(error_message) {
            return Err(Error::Translation(message));
        }

        [
            self.result,
            self.translated_text,
            self.translated_text_camel,
            self.translation,
        ]
        .into_iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::Translation("Response carried no translation".to_string()))
    }
}

/// Render an `error` member; `null` and `false` mean no error.
fn error_message(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => Some(
            map.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// Translation backend speaking JSON over HTTP.
pub struct HttpTranslationClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpTranslationClient {
    /// Create a new HTTP backend with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config("translation endpoint is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            endpoint = %config.endpoint,
            authenticated = config.api_key.is_some(),
            "Initializing HTTP translation backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(HttpClientConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn language<'a>(&self, language: &'a str) -> &'a str {
        if self.config.map_language_codes {
            backend_language_code(language)
        } else {
            language
        }
    }

    fn build_request(&self) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .header("Accept", "application/json");

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req
    }
}

#[async_trait]
impl TranslationClient for HttpTranslationClient {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let request = TranslateRequest {
            text,
            source: self.language(source_language),
            target: self.language(target_language),
            max_length: self.config.max_length,
        };

        debug!(
            chars = text.chars().count(),
            source = request.source,
            target = request.target,
            "Sending translation request"
        );

        let response = self.build_request().json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<TranslateResponse>(&body)
                .ok()
                .and_then(|r| r.error.as_ref().and_then(error_message))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(to_transq_error(
                ServiceErrorCode::from_status(status.as_u16()),
                &message,
            ));
        }

        serde_json::from_str::<TranslateResponse>(&body)?.into_translation()
    }

    fn name(&self) -> &str {
        "http"
    }
}
