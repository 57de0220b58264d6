//! Trait definitions for the collaborators the core depends on.

use async_trait::async_trait;

use crate::error::Result;

/// Backend that translates one chunk of text.
///
/// Implementations are stateless from the core's point of view and are
/// shared across concurrent dispatches, so they must be `Send + Sync`.
/// Timeouts and retries are applied by the caller.
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// Translate `text` from `source_language` to `target_language`.
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String>;

    /// Short backend name used in logs.
    fn name(&self) -> &str {
        "translation"
    }
}
