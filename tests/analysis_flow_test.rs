//! End-to-end flow: HTTP exchange -> envelope extraction -> shared parsing.

use photo_describe::{
    AnalysisRequest, AnalysisStatus, GeminiProvider, OllamaProvider, RetryingClient,
    VisionProvider,
};
use std::time::Duration;

fn retry() -> RetryingClient {
    RetryingClient::new(0, Duration::from_millis(1), Duration::from_millis(1))
}

fn request() -> AnalysisRequest {
    AnalysisRequest::new("alley.jpg", vec![0xFF, 0xD8], "Describe this photo".to_string())
}

#[tokio::test]
async fn fenced_json_reply_parses_into_structured_result() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"response": "```json\n{\"title\": \"Old Town Alley\", \"caption\": \"A narrow cobblestone alley at dusk.\", \"keywords\": \"alley, cobblestone, dusk, old town\"}\n```"}"#,
        )
        .create();

    let provider = OllamaProvider::with_base_url(server.url(), "llava".to_string());
    let result = retry().analyze(&provider, &request()).await;

    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.title, "Old Town Alley");
    assert_eq!(result.caption, "A narrow cobblestone alley at dusk.");
    assert_eq!(result.keywords.len(), 4);
    assert_eq!(result.keywords[0].description, "alley");
    assert!(result.elapsed > Duration::ZERO);
    mock.assert();
}

#[tokio::test]
async fn prose_reply_degrades_to_heuristic_result() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body(r#"{"response": "A fishing boat moored in calm morning water."}"#)
        .create();

    let provider = OllamaProvider::with_base_url(server.url(), "llava".to_string());
    let result = retry().analyze(&provider, &request()).await;

    // Parse degradation is never a failure
    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.caption, "A fishing boat moored in calm morning water.");
    assert_eq!(result.headline, result.caption);
    mock.assert();
}

#[tokio::test]
async fn auth_failure_becomes_a_failure_result() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
        .match_query(mockito::Matcher::Any)
        .with_status(401)
        .with_body(r#"{"error": {"message": "API key not valid"}}"#)
        .create();

    let provider = GeminiProvider::with_base_url(
        "bad-key".to_string(),
        server.url(),
        "gemini-2.0-flash".to_string(),
    );
    // Even with retries configured, 401 is surfaced after a single call
    let client = RetryingClient::new(3, Duration::from_millis(1), Duration::from_millis(10));
    let result = client.analyze(&provider, &request()).await;

    assert_eq!(result.status, AnalysisStatus::Failure);
    let message = result.error_message.unwrap();
    assert!(message.contains("invalid API key"), "got: {message}");
    assert!(result.title.is_empty());
    mock.assert();
}

#[tokio::test]
async fn provider_test_connection_reports_through_facade_shape() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(r#"{"models": [{"name": "llava:latest"}]}"#)
        .create();

    let provider = OllamaProvider::with_base_url(server.url(), "llava".to_string());
    let message = provider.test_connection().await.unwrap();
    assert!(message.contains("installed"));
    mock.assert();
}
