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

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI backend. Authenticates with a Bearer header and sends the image
/// as a base64 data URL inside a multimodal chat message.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, AnalysisError> {
        // Try config first, then fall back to environment variable
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| AnalysisError::MissingKey("openai".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(OpenAIProvider {
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
        OpenAIProvider {
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
impl VisionProvider for OpenAIProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let data_url = format!(
            "data:{};base64,{}",
            mime_for(&request.file_name),
            STANDARD.encode(&request.image_bytes)
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.prompt_text },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }],
                "temperature": self.temperature,
                "max_tokens": self.max_tokens
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
                warn!("OpenAI returned a non-JSON body for {}", request.file_name);
                return Ok(body);
            }
        };
        debug!("{:?}", response_body);

        match response_body["choices"][0]["message"]["content"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => {
                warn!(
                    "unexpected OpenAI response envelope for {}",
                    request.file_name
                );
                Ok(body)
            }
        }
    }

    async fn test_connection(&self) -> Result<String, AnalysisError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let count = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json["data"].as_array().map(|models| models.len()))
            .unwrap_or(0);

        Ok(format!("OpenAI API reachable ({} models listed)", count))
    }
}
