use crate::config::ProviderConfig;
use crate::error::AnalysisError;
use crate::model::AnalysisRequest;
use crate::providers::{classify_status, mime_for, VisionProvider};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini backend. Authenticates with a query-string key and sends
/// the image as an inline base64 part.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiProvider {
    /// Create a new Gemini provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, AnalysisError> {
        // Try config first, then fall back to environment variable
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| AnalysisError::MissingKey("gemini".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(GeminiProvider {
            client,
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(api_key: String, base_url: String, model: String) -> Self {
        GeminiProvider {
            client: Client::new(),
            api_key,
            base_url,
            model,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "contents": [{
                    "parts": [
                        { "text": request.prompt_text },
                        {
                            "inline_data": {
                                "mime_type": mime_for(&request.file_name),
                                "data": STANDARD.encode(&request.image_bytes)
                            }
                        }
                    ]
                }],
                "generationConfig": {
                    "temperature": self.temperature,
                    "maxOutputTokens": self.max_tokens
                }
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let response_body: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => {
                warn!("Gemini returned a non-JSON body for {}", request.file_name);
                return Ok(body);
            }
        };
        debug!("{:?}", response_body);

        match response_body["candidates"][0]["content"]["parts"][0]["text"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => {
                // 200 with an unexpected envelope: hand the whole body to
                // the shared parser instead of failing
                warn!(
                    "unexpected Gemini response envelope for {}",
                    request.file_name
                );
                Ok(body)
            }
        }
    }

    async fn test_connection(&self) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/v1beta/models/{}?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        Ok(format!("model '{}' is available", self.model))
    }
}
