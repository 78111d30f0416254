use crate::config::Preferences;
use crate::model::MetadataContext;

/// The default analysis prompt sent to vision backends.
///
/// Loaded from `prompts/default.txt` at compile time using the
/// `include_str!` macro, making it easy to edit without dealing with
/// Rust string syntax.
pub const DEFAULT_PROMPT: &str = include_str!("prompts/default.txt");

/// Named prompt presets selectable via `Preferences::preset`.
pub const PRESETS: &[(&str, &str)] = &[
    ("default", DEFAULT_PROMPT),
    ("detailed", include_str!("prompts/detailed.txt")),
    ("concise", include_str!("prompts/concise.txt")),
    ("stock", include_str!("prompts/stock.txt")),
];

/// Look up a preset prompt body by name.
pub fn preset(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset_name, _)| *preset_name == name)
        .map(|(_, text)| *text)
}

/// Assemble the full analysis prompt from a base prompt, user preferences
/// and optional photo metadata.
///
/// Deterministic for identical inputs: same base, preferences and metadata
/// always produce the same text.
pub fn build_prompt(
    base: &str,
    preferences: &Preferences,
    metadata: Option<&MetadataContext>,
) -> String {
    let mut prompt = String::new();

    // Non-default response language gets an explicit instruction up front
    if !preferences
        .response_language
        .eq_ignore_ascii_case("english")
    {
        prompt.push_str(&format!(
            "Important: write every output field (title, caption, headline, instructions, location, keywords) in {}.\n\n",
            preferences.response_language
        ));
    }

    prompt.push_str(base.trim_end());

    if preferences.hierarchical_keywords {
        let sep = &preferences.keyword_separator;
        prompt.push_str(&format!(
            "\n\nFor keywords: return between 8 and 12 keywords, each written as a \
hierarchy from broad to specific with levels joined by \"{sep}\". \
Example: \"Nature{sep}Wildlife{sep}Birds\"."
        ));
    }

    if let Some(context) = metadata.filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n--- Additional photo context (advisory, the image itself takes precedence) ---");
        if let (Some(lat), Some(lon)) = (context.gps_latitude, context.gps_longitude) {
            prompt.push_str(&format!("\nGPS coordinates: {lat:.6}, {lon:.6}"));
        }
        match (&context.camera_make, &context.camera_model) {
            (Some(make), Some(model)) => prompt.push_str(&format!("\nCamera: {make} {model}")),
            (Some(make), None) => prompt.push_str(&format!("\nCamera: {make}")),
            (None, Some(model)) => prompt.push_str(&format!("\nCamera: {model}")),
            (None, None) => {}
        }
        if let Some(lens) = &context.lens {
            prompt.push_str(&format!("\nLens: {lens}"));
        }
        if let Some(exposure) = &context.exposure {
            prompt.push_str(&format!("\nExposure: {exposure}"));
        }
        if let Some(captured_at) = &context.captured_at {
            prompt.push_str(&format!("\nCaptured: {captured_at}"));
        }
        if let Some(dimensions) = &context.dimensions {
            prompt.push_str(&format!("\nDimensions: {dimensions}"));
        }
        if let Some(copyright) = &context.copyright {
            prompt.push_str(&format!("\nCopyright: {copyright}"));
        }
    }

    prompt
}
