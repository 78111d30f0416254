use crate::config::ProviderConfig;
use crate::error::AnalysisError;
use crate::model::AnalysisRequest;
use crate::providers::{classify_status, VisionProvider};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local Ollama backend. No credentials; the image goes into the `images`
/// array of `/api/generate` and the reply carries a flat `response` field.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaProvider {
    /// Create a new Ollama provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, AnalysisError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(OllamaProvider {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    #[doc(hidden)]
    pub fn with_base_url(base_url: String, model: String) -> Self {
        OllamaProvider {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

#[async_trait]
impl VisionProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": self.model,
                "prompt": request.prompt_text,
                "images": [STANDARD.encode(&request.image_bytes)],
                "stream": false,
                "options": {
                    "temperature": self.temperature,
                    "num_predict": self.max_tokens
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
                warn!("Ollama returned a non-JSON body for {}", request.file_name);
                return Ok(body);
            }
        };
        debug!("{:?}", response_body);

        match response_body["response"].as_str() {
            Some(text) => Ok(text.to_string()),
            None => {
                warn!(
                    "unexpected Ollama response envelope for {}",
                    request.file_name
                );
                Ok(body)
            }
        }
    }

    async fn test_connection(&self) -> Result<String, AnalysisError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let json: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let installed: Vec<String> = json["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        // "llava" matches "llava:latest"
        let found = installed
            .iter()
            .any(|name| name == &self.model || name.starts_with(&format!("{}:", self.model)));

        if found {
            Ok(format!("model '{}' is installed", self.model))
        } else {
            Err(AnalysisError::BadRequest(format!(
                "model '{}' is not installed on the Ollama server ({} models available)",
                self.model,
                installed.len()
            )))
        }
    }
}
