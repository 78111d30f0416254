mod factory;
mod gemini;
mod ollama;
mod openai;

pub use factory::ProviderFactory;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;

use crate::error::AnalysisError;
use crate::model::AnalysisRequest;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

/// Unified trait for all vision backends.
///
/// Implementations shape the backend-specific request (auth, image encoding,
/// generation knobs), perform exactly one HTTP exchange and extract the text
/// payload from the backend's response envelope. They never retry (that is
/// the retry client's job) and never parse business fields (that is the
/// shared parser's job).
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Get the provider name (e.g., "gemini", "ollama", "openai")
    fn provider_name(&self) -> &str;

    /// Analyze one image, returning the extracted text payload
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, AnalysisError>;

    /// Cheap round trip to validate credentials and model availability,
    /// without the cost of a full image analysis
    async fn test_connection(&self) -> Result<String, AnalysisError>;
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// Shared by all providers so 401/429/400 behave identically regardless of
/// backend.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> AnalysisError {
    let message = extract_api_message(body);
    match status.as_u16() {
        401 | 403 => AnalysisError::Auth(message),
        429 => AnalysisError::RateLimited(message),
        400 => AnalysisError::BadRequest(message),
        code => AnalysisError::Api {
            status: code,
            message,
        },
    }
}

/// Pull a human-readable error out of a backend error body, falling back to
/// the raw body.
fn extract_api_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = json["error"]["message"].as_str() {
            return msg.to_string();
        }
        if let Some(msg) = json["error"].as_str() {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail provided".to_string()
    } else {
        trimmed.chars().take(300).collect()
    }
}

/// Guess the MIME type from the file name extension; backends want it next
/// to the inline image data. Defaults to JPEG.
pub(crate) fn mime_for(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".heic") || lower.ends_with(".heif") {
        "image/heic"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_taxonomy() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, AnalysisError::Auth(_)));

        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err, AnalysisError::RateLimited(_)));
        assert!(err.is_retryable());

        let err = classify_status(StatusCode::BAD_REQUEST, "");
        assert!(matches!(err, AnalysisError::BadRequest(_)));
        assert!(!err.is_retryable());

        let err = classify_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_extract_api_message_from_nested_error() {
        let body = r#"{"error": {"message": "API key not valid", "code": 400}}"#;
        assert_eq!(extract_api_message(body), "API key not valid");
    }

    #[test]
    fn test_extract_api_message_from_flat_error() {
        let body = r#"{"error": "model not found"}"#;
        assert_eq!(extract_api_message(body), "model not found");
    }

    #[test]
    fn test_extract_api_message_falls_back_to_body() {
        assert_eq!(extract_api_message("plain failure"), "plain failure");
        assert_eq!(extract_api_message("  "), "no error detail provided");
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for("IMG_0001.JPG"), "image/jpeg");
        assert_eq!(mime_for("shot.png"), "image/png");
        assert_eq!(mime_for("clip.webp"), "image/webp");
        assert_eq!(mime_for("pic.HEIC"), "image/heic");
        assert_eq!(mime_for("unknown"), "image/jpeg");
    }
}
