//! Descriptive metadata for photos via interchangeable AI vision backends.
//!
//! Submit images to Gemini, a local Ollama instance or OpenAI and get back
//! a canonical [`AnalysisResult`]: title, caption, headline, usage
//! instructions, location and ordered (optionally hierarchical) keywords.
//! The crate owns prompt assembly, retry/backoff, bounded-concurrency batch
//! execution and resilient parsing of model output; the photo catalog, UI
//! and export layers are external collaborators.

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod secrets;

pub use batch::{BatchHandle, BatchOptions, BatchProgress, BatchScheduler, ProgressSnapshot};
pub use config::{AiConfig, Preferences, ProviderConfig};
pub use error::AnalysisError;
pub use model::{
    AnalysisRequest, AnalysisResult, AnalysisStatus, Keyword, MetadataContext, PhotoInput,
};
pub use providers::{
    GeminiProvider, OllamaProvider, OpenAIProvider, ProviderFactory, VisionProvider,
};
pub use retry::RetryingClient;
pub use secrets::{KeychainStore, MemoryStore, SecretStore};

/// Analyze a single image file with the configured default provider.
pub async fn analyze_file(path: &str) -> Result<AnalysisResult, AnalysisError> {
    let config = AiConfig::load()?;
    let factory = ProviderFactory::new(config);
    let image_bytes = tokio::fs::read(path).await?;
    factory.analyze(&file_name_of(path), image_bytes, None).await
}

/// Analyze several image files as one batch, returning results in input
/// order once the whole batch has drained.
pub async fn analyze_files(paths: &[String]) -> Result<Vec<AnalysisResult>, AnalysisError> {
    let config = AiConfig::load()?;
    let factory = ProviderFactory::new(config);

    let mut photos = Vec::with_capacity(paths.len());
    for path in paths {
        let image_bytes = tokio::fs::read(path).await?;
        photos.push(PhotoInput::new(file_name_of(path), image_bytes));
    }

    let mut indexed = factory.analyze_batch(photos)?.collect().await;
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, result)| result).collect())
}

pub(crate) fn file_name_of(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("/photos/2024/IMG_0001.jpg"), "IMG_0001.jpg");
        assert_eq!(file_name_of("plain.png"), "plain.png");
    }
}
