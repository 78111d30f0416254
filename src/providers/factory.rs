use crate::batch::{BatchHandle, BatchOptions, BatchProgress, BatchScheduler};
use crate::config::{AiConfig, ProviderConfig};
use crate::error::AnalysisError;
use crate::model::{AnalysisRequest, AnalysisResult, MetadataContext, PhotoInput};
use crate::prompt;
use crate::providers::{GeminiProvider, OllamaProvider, OpenAIProvider, VisionProvider};
use crate::retry::RetryingClient;
use crate::secrets::{KeychainStore, SecretStore};
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Facade over the interchangeable vision backends.
///
/// Holds the single global provider selection, resolves API keys
/// (configuration, then secret store, then environment), and exposes the
/// analysis entry points to the UI/CLI collaborators. Switching providers
/// while a batch is in flight is rejected.
pub struct ProviderFactory {
    config: AiConfig,
    secrets: Arc<dyn SecretStore>,
    current: Mutex<String>,
    batches: Mutex<Vec<Arc<BatchProgress>>>,
}

impl ProviderFactory {
    /// Create a factory backed by the OS keychain.
    pub fn new(config: AiConfig) -> Self {
        Self::with_secret_store(config, Arc::new(KeychainStore))
    }

    /// Create a factory with an explicit secret store (tests, headless use).
    pub fn with_secret_store(config: AiConfig, secrets: Arc<dyn SecretStore>) -> Self {
        let current = config.default_provider.clone();
        ProviderFactory {
            config,
            secrets,
            current: Mutex::new(current),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// List all supported provider names
    pub fn available_providers() -> Vec<&'static str> {
        vec!["gemini", "ollama", "openai"]
    }

    /// Currently selected provider id
    pub fn current_provider(&self) -> String {
        self.current_lock().clone()
    }

    /// Switch the global provider selection.
    ///
    /// Rejected while any batch is still running; retry after it drains.
    pub fn set_current_provider(&self, id: &str) -> Result<(), AnalysisError> {
        if !Self::available_providers().contains(&id) {
            return Err(AnalysisError::UnknownProvider(id.to_string()));
        }
        if self.has_active_batch() {
            return Err(AnalysisError::InvalidState(
                "cannot switch providers while a batch is running".to_string(),
            ));
        }
        *self.current_lock() = id.to_string();
        Ok(())
    }

    /// Build the currently selected provider
    pub fn active(&self) -> Result<Arc<dyn VisionProvider>, AnalysisError> {
        self.build(&self.current_provider())
    }

    /// Analyze a single photo with the selected provider.
    ///
    /// Per-photo analysis failures come back inside the
    /// [`AnalysisResult`]; `Err` is reserved for setup problems (unknown
    /// provider, missing key).
    pub async fn analyze(
        &self,
        file_name: &str,
        image_bytes: Vec<u8>,
        metadata: Option<&MetadataContext>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let name = self.current_provider();
        let provider = self.build(&name)?;
        let retry = RetryingClient::from_config(self.provider_config(&name)?);
        let request = self.request_for(file_name, image_bytes, metadata);
        Ok(retry.analyze(provider.as_ref(), &request).await)
    }

    /// Analyze many photos under the configured concurrency budget and
    /// pacing delay. Results stream through the returned handle.
    pub fn analyze_batch(&self, photos: Vec<PhotoInput>) -> Result<BatchHandle, AnalysisError> {
        let name = self.current_provider();
        let provider = self.build(&name)?;
        let retry = RetryingClient::from_config(self.provider_config(&name)?);

        let prefs = &self.config.preferences;
        let options = BatchOptions {
            concurrency: prefs.effective_concurrency(),
            pacing_delay: (prefs.pacing_delay_ms > 0)
                .then(|| Duration::from_millis(prefs.pacing_delay_ms)),
        };

        let requests: Vec<AnalysisRequest> = photos
            .into_iter()
            .map(|photo| {
                self.request_for(&photo.file_name, photo.image_bytes, photo.metadata.as_ref())
            })
            .collect();

        let handle = BatchScheduler::new(provider, retry, options).run(requests);
        self.batches_lock().push(handle.progress());
        Ok(handle)
    }

    /// Cheap credential/model round trip for the selected provider
    pub async fn test_connection(&self) -> (bool, String) {
        match self.active() {
            Ok(provider) => match provider.test_connection().await {
                Ok(message) => (true, message),
                Err(e) => (false, e.to_string()),
            },
            Err(e) => (false, e.to_string()),
        }
    }

    pub fn default_prompt(&self) -> &'static str {
        prompt::DEFAULT_PROMPT
    }

    pub fn presets(&self) -> &'static [(&'static str, &'static str)] {
        prompt::PRESETS
    }

    pub fn preferences(&self) -> &crate::config::Preferences {
        &self.config.preferences
    }

    // Key management pass-throughs. The secret is an opaque string and is
    // never logged.

    pub fn store_key(&self, provider: &str, key: &str) -> Result<(), AnalysisError> {
        self.secrets.store(provider, key)
    }

    pub fn get_key(&self, provider: &str) -> Result<Option<String>, AnalysisError> {
        self.secrets.retrieve(provider)
    }

    pub fn clear_key(&self, provider: &str) -> Result<(), AnalysisError> {
        self.secrets.clear(provider)
    }

    pub fn has_key(&self, provider: &str) -> bool {
        matches!(self.secrets.retrieve(provider), Ok(Some(_)))
    }

    fn provider_config(&self, name: &str) -> Result<&ProviderConfig, AnalysisError> {
        self.config
            .providers
            .get(name)
            .ok_or_else(|| AnalysisError::UnknownProvider(name.to_string()))
    }

    fn build(&self, name: &str) -> Result<Arc<dyn VisionProvider>, AnalysisError> {
        let config = self.provider_config(name)?;
        if !config.enabled {
            return Err(AnalysisError::ProviderDisabled(name.to_string()));
        }

        // Keys resolve config -> secret store -> environment; the providers
        // themselves handle the environment fallback
        let mut config = config.clone();
        if config.api_key.is_none() {
            config.api_key = self.secrets.retrieve(name)?;
        }

        match name {
            "gemini" => Ok(Arc::new(GeminiProvider::new(&config)?)),
            "ollama" => Ok(Arc::new(OllamaProvider::new(&config)?)),
            "openai" => Ok(Arc::new(OpenAIProvider::new(&config)?)),
            other => Err(AnalysisError::UnknownProvider(other.to_string())),
        }
    }

    fn request_for(
        &self,
        file_name: &str,
        image_bytes: Vec<u8>,
        metadata: Option<&MetadataContext>,
    ) -> AnalysisRequest {
        let prefs = &self.config.preferences;

        let base = if let Some(custom) = &prefs.custom_prompt {
            custom.as_str()
        } else if let Some(name) = &prefs.preset {
            prompt::preset(name).unwrap_or_else(|| {
                warn!("unknown prompt preset '{}', using the default prompt", name);
                prompt::DEFAULT_PROMPT
            })
        } else {
            prompt::DEFAULT_PROMPT
        };

        // Privacy setting: metadata only reaches the prompt when opted in
        let metadata = metadata.filter(|_| prefs.include_metadata);
        let prompt_text = prompt::build_prompt(base, prefs, metadata);

        AnalysisRequest::new(file_name, image_bytes, prompt_text)
    }

    fn has_active_batch(&self) -> bool {
        let mut batches = self.batches_lock();
        batches.retain(|progress| !progress.is_finished());
        !batches.is_empty()
    }

    fn current_lock(&self) -> MutexGuard<'_, String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn batches_lock(&self) -> MutexGuard<'_, Vec<Arc<BatchProgress>>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preferences;
    use crate::secrets::MemoryStore;
    use std::collections::HashMap;

    fn test_provider_config(model: &str) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            model: model.to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            api_key: Some("test-key".to_string()),
            base_url: None,
            timeout: 60,
            max_retries: 2,
            retry_delay_ms: 10,
            backoff_cap_secs: 1,
        }
    }

    fn test_config() -> AiConfig {
        let mut providers = HashMap::new();
        providers.insert("gemini".to_string(), test_provider_config("gemini-2.0-flash"));
        providers.insert("openai".to_string(), test_provider_config("gpt-4o-mini"));
        providers.insert("ollama".to_string(), test_provider_config("llava"));

        AiConfig {
            default_provider: "gemini".to_string(),
            providers,
            preferences: Preferences::default(),
        }
    }

    fn test_factory() -> ProviderFactory {
        ProviderFactory::with_secret_store(test_config(), Arc::new(MemoryStore::default()))
    }

    #[test]
    fn test_default_selection_from_config() {
        let factory = test_factory();
        assert_eq!(factory.current_provider(), "gemini");
        assert_eq!(factory.active().unwrap().provider_name(), "gemini");
    }

    #[test]
    fn test_switch_provider() {
        let factory = test_factory();
        factory.set_current_provider("ollama").unwrap();
        assert_eq!(factory.current_provider(), "ollama");
        assert_eq!(factory.active().unwrap().provider_name(), "ollama");
    }

    #[test]
    fn test_switch_to_unknown_provider() {
        let factory = test_factory();
        let err = factory.set_current_provider("claude").unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownProvider(_)));
        assert_eq!(factory.current_provider(), "gemini");
    }

    #[test]
    fn test_disabled_provider_rejected() {
        let mut config = test_config();
        if let Some(provider) = config.providers.get_mut("openai") {
            provider.enabled = false;
        }
        let factory =
            ProviderFactory::with_secret_store(config, Arc::new(MemoryStore::default()));

        let err = factory.build("openai").map(|_| ()).unwrap_err();
        assert!(matches!(err, AnalysisError::ProviderDisabled(_)));
    }

    #[test]
    fn test_missing_config_entry() {
        let mut config = test_config();
        config.providers.remove("openai");
        let factory =
            ProviderFactory::with_secret_store(config, Arc::new(MemoryStore::default()));

        let err = factory.build("openai").map(|_| ()).unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownProvider(_)));
    }

    #[test]
    fn test_key_management_pass_through() {
        let factory = test_factory();
        assert!(!factory.has_key("gemini"));

        factory.store_key("gemini", "sk-secret").unwrap();
        assert!(factory.has_key("gemini"));
        assert_eq!(factory.get_key("gemini").unwrap().as_deref(), Some("sk-secret"));

        factory.clear_key("gemini").unwrap();
        assert!(!factory.has_key("gemini"));
    }

    #[test]
    fn test_key_resolved_from_secret_store() {
        let mut config = test_config();
        if let Some(provider) = config.providers.get_mut("gemini") {
            provider.api_key = None;
        }
        let secrets = Arc::new(MemoryStore::default());
        secrets.store("gemini", "from-keychain").unwrap();

        let factory = ProviderFactory::with_secret_store(config, secrets);
        assert!(factory.build("gemini").is_ok());
    }

    #[test]
    fn test_available_providers() {
        let providers = ProviderFactory::available_providers();
        assert_eq!(providers.len(), 3);
        assert!(providers.contains(&"gemini"));
        assert!(providers.contains(&"ollama"));
        assert!(providers.contains(&"openai"));
    }

    #[test]
    fn test_prompt_access() {
        let factory = test_factory();
        assert!(!factory.default_prompt().is_empty());
        assert_eq!(factory.presets().len(), 4);
    }

    #[test]
    fn test_request_uses_preset_and_privacy_flag() {
        let mut config = test_config();
        config.preferences.preset = Some("concise".to_string());
        config.preferences.include_metadata = false;
        let factory =
            ProviderFactory::with_secret_store(config, Arc::new(MemoryStore::default()));

        let context = MetadataContext {
            camera_make: Some("Nikon".to_string()),
            ..Default::default()
        };
        let request = factory.request_for("a.jpg", vec![1], Some(&context));
        assert!(request.prompt_text.contains("briefly"));
        // Metadata suppressed while the privacy flag is off
        assert!(!request.prompt_text.contains("Nikon"));
    }

    #[test]
    fn test_request_includes_metadata_when_opted_in() {
        let mut config = test_config();
        config.preferences.include_metadata = true;
        let factory =
            ProviderFactory::with_secret_store(config, Arc::new(MemoryStore::default()));

        let context = MetadataContext {
            camera_make: Some("Nikon".to_string()),
            ..Default::default()
        };
        let request = factory.request_for("a.jpg", vec![1], Some(&context));
        assert!(request.prompt_text.contains("Nikon"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_provider_switch_rejected_mid_batch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "{\"title\":\"x\"}"}"#)
            .expect_at_least(1)
            .create();

        let mut config = test_config();
        config.default_provider = "ollama".to_string();
        config.preferences.pacing_delay_ms = 50;
        if let Some(provider) = config.providers.get_mut("ollama") {
            provider.base_url = Some(server.url());
        }
        let factory =
            ProviderFactory::with_secret_store(config, Arc::new(MemoryStore::default()));

        let photos = (0..10)
            .map(|i| PhotoInput::new(format!("p{i}.jpg"), vec![1]))
            .collect();
        let handle = factory.analyze_batch(photos).unwrap();

        let err = factory.set_current_provider("gemini").unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidState(_)));

        handle.cancel();
        let _ = handle.collect().await;
    }
}
