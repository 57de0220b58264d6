//! HTTP translation service backend.
//!
//! Talks to a JSON translation endpoint of the NLLB-serving kind:
//!
//! ```text
//! POST {TRANSLATION_API_URL}
//! {"text": "...", "source": "eng_Latn", "target": "zho_Hans", "max_length": 1000}
//! ```
//!
//! The translated text may come back under `result`, `translated_text`,
//! `translatedText` or `translation`; an `error` member marks a failure even
//! on HTTP 200.
//!
//! # Example
//!
//! ```rust,no_run
//! use transq_client::http::{HttpClientConfig, HttpTranslationClient};
//! use transq_core::TranslationClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = HttpClientConfig::default()
//!         .with_endpoint("http://localhost:8080/api/v4/translator")
//!         .with_api_key("secret");
//!     let client = HttpTranslationClient::new(config).unwrap();
//!     let text = client.translate("Good morning", "en", "fr").await.unwrap();
//!     println!("{text}");
//! }
//! ```

mod client;
mod error;
mod language;

pub use client::{HttpClientConfig, HttpTranslationClient};
pub use error::{to_transq_error, ServiceErrorCode};
pub use language::backend_language_code;
