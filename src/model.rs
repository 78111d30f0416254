use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One keyword extracted from a model response.
///
/// `description` may encode a taxonomy path such as
/// `"Nature > Wildlife > Birds"`; this crate treats the path as an opaque
/// string and leaves expansion into parent/child entries to the catalog
/// writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub description: String,
    /// User-togglable in the review UI; always true on creation
    pub selected: bool,
}

impl Keyword {
    pub fn new(description: impl Into<String>) -> Self {
        Keyword {
            description: description.into(),
            selected: true,
        }
    }
}

/// Camera/GPS context attached to a prompt when the privacy setting allows it.
///
/// Every field is optional; absent fields are simply omitted from the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataContext {
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens: Option<String>,
    pub exposure: Option<String>,
    pub captured_at: Option<String>,
    pub dimensions: Option<String>,
    pub copyright: Option<String>,
}

impl MetadataContext {
    pub fn is_empty(&self) -> bool {
        self.gps_latitude.is_none()
            && self.gps_longitude.is_none()
            && self.camera_make.is_none()
            && self.camera_model.is_none()
            && self.lens.is_none()
            && self.exposure.is_none()
            && self.captured_at.is_none()
            && self.dimensions.is_none()
            && self.copyright.is_none()
    }
}

/// A single image analysis to perform, created per photo and never mutated.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image_bytes: Vec<u8>,
    /// For logging and result correlation only; never sent to the backend
    pub file_name: String,
    /// Fully assembled prompt, attached to the request verbatim
    pub prompt_text: String,
}

impl AnalysisRequest {
    pub fn new(file_name: impl Into<String>, image_bytes: Vec<u8>, prompt_text: String) -> Self {
        AnalysisRequest {
            image_bytes,
            file_name: file_name.into(),
            prompt_text,
        }
    }
}

/// One photo handed in by the UI/CLI collaborator for batch analysis.
#[derive(Debug, Clone)]
pub struct PhotoInput {
    pub file_name: String,
    pub image_bytes: Vec<u8>,
    pub metadata: Option<MetadataContext>,
}

impl PhotoInput {
    pub fn new(file_name: impl Into<String>, image_bytes: Vec<u8>) -> Self {
        PhotoInput {
            file_name: file_name.into(),
            image_bytes,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataContext) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Failure,
}

/// Canonical outcome of one image analysis.
///
/// Success results carry the descriptive fields (empty strings when the
/// model omitted them) and never an error message; failure results carry
/// only the error message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub title: String,
    pub caption: String,
    pub headline: String,
    pub instructions: String,
    pub location: String,
    pub copyright: String,
    /// Insertion order = order extracted from the response, never re-sorted
    pub keywords: Vec<Keyword>,
    pub error_message: Option<String>,
    pub elapsed: Duration,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        AnalysisResult {
            status: AnalysisStatus::Success,
            title: String::new(),
            caption: String::new(),
            headline: String::new(),
            instructions: String::new(),
            location: String::new(),
            copyright: String::new(),
            keywords: Vec::new(),
            error_message: None,
            elapsed: Duration::ZERO,
        }
    }
}

impl AnalysisResult {
    /// Build a failure result; all text fields stay empty by invariant.
    pub fn failure(message: impl Into<String>, elapsed: Duration) -> Self {
        AnalysisResult {
            status: AnalysisStatus::Failure,
            error_message: Some(message.into()),
            elapsed,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_defaults_to_selected() {
        let kw = Keyword::new("Nature > Wildlife > Birds");
        assert!(kw.selected);
        assert_eq!(kw.description, "Nature > Wildlife > Birds");
    }

    #[test]
    fn test_failure_result_invariant() {
        let result = AnalysisResult::failure("boom", Duration::from_millis(5));
        assert_eq!(result.status, AnalysisStatus::Failure);
        assert_eq!(result.error_message.as_deref(), Some("boom"));
        assert!(result.title.is_empty());
        assert!(result.caption.is_empty());
        assert!(result.keywords.is_empty());
    }

    #[test]
    fn test_metadata_context_is_empty() {
        assert!(MetadataContext::default().is_empty());
        let ctx = MetadataContext {
            camera_make: Some("Fujifilm".to_string()),
            ..Default::default()
        };
        assert!(!ctx.is_empty());
    }
}
