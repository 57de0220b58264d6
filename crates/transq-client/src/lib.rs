//! # transq-client
//!
//! Translation backends for transq.
//!
//! This crate provides:
//! - HTTP translation service client (default, feature `http`)
//! - Deterministic mock backend (feature `mock`)
//!
//! Both implement [`transq_core::TranslationClient`]. Neither retries nor
//! enforces a deadline on its own; the job scheduler wraps every call.
//!
//! # Example
//!
//! ```rust,no_run
//! use transq_client::HttpTranslationClient;
//! use transq_core::TranslationClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = HttpTranslationClient::from_env().unwrap();
//!     let text = client.translate("Hello", "en", "zh").await.unwrap();
//!     println!("{text}");
//! }
//! ```

#[cfg(feature = "http")]
pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use transq_core::{Error, Result, TranslationClient};

#[cfg(feature = "http")]
pub use http::{HttpClientConfig, HttpTranslationClient};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCall, MockTranslationClient};
