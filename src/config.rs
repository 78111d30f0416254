use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

/// Main AI configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    /// Provider to use when none is selected explicitly
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Map of provider name to provider configuration
    pub providers: HashMap<String, ProviderConfig>,
    /// User preferences for prompt building and batch execution
    #[serde(default)]
    pub preferences: Preferences,
}

/// Configuration for a specific AI provider
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Whether this provider is enabled
    pub enabled: bool,
    /// Model identifier (e.g., "gemini-2.0-flash", "gpt-4o-mini", "llava")
    pub model: String,
    /// Temperature for generation (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// API key for authentication (also resolvable via keychain or environment)
    pub api_key: Option<String>,
    /// Base URL for API endpoint (for custom or proxy endpoints)
    pub base_url: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Extra attempts after the first failed one (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds (uses exponential backoff)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Upper bound on a single backoff wait, in seconds
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

/// User preferences shared by prompt building and batch execution.
///
/// Passed explicitly into the components that need them; there is no
/// ambient global settings object.
#[derive(Debug, Deserialize, Clone)]
pub struct Preferences {
    /// Language all output fields should be written in
    #[serde(default = "default_language")]
    pub response_language: String,
    /// Ask the model for broad-to-specific keyword chains
    #[serde(default)]
    pub hierarchical_keywords: bool,
    /// Separator between taxonomy levels in a hierarchical keyword
    #[serde(default = "default_keyword_separator")]
    pub keyword_separator: String,
    /// Privacy flag: attach EXIF/GPS context to prompts only when true
    #[serde(default)]
    pub include_metadata: bool,
    /// Upper bound on simultaneously in-flight analyses
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Minimum spacing between request dispatches, 0 = disabled
    #[serde(default)]
    pub pacing_delay_ms: u64,
    /// Named prompt preset to use instead of the default prompt
    #[serde(default)]
    pub preset: Option<String>,
    /// Free-form prompt overriding both the default and any preset
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            response_language: default_language(),
            hierarchical_keywords: false,
            keyword_separator: default_keyword_separator(),
            include_metadata: false,
            max_concurrency: default_max_concurrency(),
            pacing_delay_ms: 0,
            preset: None,
            custom_prompt: None,
        }
    }
}

impl Preferences {
    /// Concurrency budget actually used for a batch:
    /// `min(available_parallelism, configured max)`, never below 1.
    pub fn effective_concurrency(&self) -> usize {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_concurrency.clamp(1, hardware.max(1))
    }
}

// Default value functions
fn default_provider() -> String {
    "gemini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_backoff_cap_secs() -> u64 {
    30
}

fn default_language() -> String {
    "English".to_string()
}

fn default_keyword_separator() -> String {
    " > ".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

impl AiConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with PHOTODESCRIBE__ prefix
    /// 2. config.toml file in current directory
    /// 3. Default values
    ///
    /// Environment variable format: PHOTODESCRIBE__PROVIDERS__GEMINI__API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            // Optional config file (can be missing)
            .add_source(File::with_name("config").required(false))
            // Use double underscore for nested: PHOTODESCRIBE__PROVIDERS__GEMINI__MODEL
            .add_source(
                Environment::with_prefix("PHOTODESCRIBE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_provider(), "gemini");
        assert_eq!(default_temperature(), 0.3);
        assert_eq!(default_max_tokens(), 2000);
        assert_eq!(default_max_retries(), 2);
        assert_eq!(default_retry_delay_ms(), 1000);
        assert_eq!(default_backoff_cap_secs(), 30);
    }

    #[test]
    fn test_preferences_defaults() {
        let prefs = Preferences::default();
        assert_eq!(prefs.response_language, "English");
        assert!(!prefs.hierarchical_keywords);
        assert_eq!(prefs.keyword_separator, " > ");
        assert!(!prefs.include_metadata);
        assert_eq!(prefs.max_concurrency, 4);
        assert_eq!(prefs.pacing_delay_ms, 0);
    }

    #[test]
    fn test_effective_concurrency_never_below_one() {
        let prefs = Preferences {
            max_concurrency: 0,
            ..Default::default()
        };
        assert_eq!(prefs.effective_concurrency(), 1);
    }

    #[test]
    fn test_effective_concurrency_caps_at_configured_max() {
        let prefs = Preferences {
            max_concurrency: 2,
            ..Default::default()
        };
        assert!(prefs.effective_concurrency() <= 2);
    }

    #[test]
    fn test_ai_config_structure() {
        let mut providers = HashMap::new();
        providers.insert(
            "gemini".to_string(),
            ProviderConfig {
                enabled: true,
                model: "gemini-2.0-flash".to_string(),
                temperature: 0.3,
                max_tokens: 2000,
                api_key: Some("test-key".to_string()),
                base_url: None,
                timeout: 60,
                max_retries: 2,
                retry_delay_ms: 1000,
                backoff_cap_secs: 30,
            },
        );

        let config = AiConfig {
            default_provider: "gemini".to_string(),
            providers,
            preferences: Preferences::default(),
        };

        assert_eq!(config.default_provider, "gemini");
        assert!(config.providers.contains_key("gemini"));
    }
}
