use epx_classifier::{
    compare_or_neutral, detect_or_neutral, AiBand, AiContentDetector, ClassifierError,
    GenerativeClient, SimilarityAnalysis, SimilarityClassifier,
};
use httpmock::prelude::*;
use serde_json::json;

fn reply(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
}

#[tokio::test]
async fn similarity_round_trip_through_mock_server() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-pro:generateContent")
                .query_param("key", "test-key");
            then.status(200).json_body(reply(
                "```json\n{\"similarityScore\": 88, \"semanticSimilarity\": 90, \"structuralSimilarity\": 70, \"vocabularyOverlap\": 65, \"plagiarismRisk\": 75, \"analysis\": \"near copy\", \"sharedConcepts\": [\"mitochondria\"], \"uniqueElements\": []}\n```",
            ));
        })
        .await;

    let client = GenerativeClient::new_with_base_url("test-key".into(), server.base_url());
    let a = client.compare("cells make energy", "energy made by cells").await.unwrap();

    mock.assert_async().await;
    assert_eq!(a.similarity_score, 88);
    assert_eq!(a.plagiarism_risk, 75);
    assert_eq!(a.analysis, "near copy");
}

#[tokio::test]
async fn detection_maps_into_high_band() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1beta/models/gemini-pro:generateContent");
            then.status(200).json_body(reply(
                "{\"aiLikelihood\": 86, \"confidence\": 77, \"explanation\": \"uniform tone\", \"flags\": [\"generic\"]}",
            ));
        })
        .await;

    let client = GenerativeClient::new_with_base_url("k".into(), server.base_url());
    let d = client.detect(&"an answer ".repeat(10)).await.unwrap();
    assert_eq!(d.band(), AiBand::High);

    let sig = d.to_signal(1_000).unwrap();
    assert_eq!(sig.ai_likelihood, Some(86.0));
}

#[tokio::test]
async fn upstream_error_is_api_error_and_degrades_to_neutral() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(503).body("overloaded");
        })
        .await;

    let client = GenerativeClient::new_with_base_url("k".into(), server.base_url());
    match client.compare("a", "b").await {
        Err(ClassifierError::Api { status, .. }) => assert_eq!(status, 503),
        other => panic!("expected api error, got {other:?}"),
    }

    let a = compare_or_neutral(&client, "a", "b").await;
    assert_eq!(a, SimilarityAnalysis::neutral());

    let d = detect_or_neutral(&client, &"long enough answer text ".repeat(4)).await.unwrap();
    assert_eq!(d.ai_likelihood, 0.0);
}

#[tokio::test]
async fn empty_key_is_config_error_without_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200).json_body(reply("{}"));
        })
        .await;

    let client = GenerativeClient::new_with_base_url(String::new(), server.base_url());
    let err = client.compare("a", "b").await.unwrap_err();
    assert!(matches!(err, ClassifierError::Config(_)));
    mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn custom_model_changes_path() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1beta/models/gemini-1.5-flash:generateContent");
            then.status(200).json_body(reply("no json here"));
        })
        .await;

    let client = GenerativeClient::new_with_base_url("k".into(), server.base_url())
        .with_model("gemini-1.5-flash");
    let a = client.compare("a", "b").await.unwrap();
    mock.assert_async().await;
    assert_eq!(a, SimilarityAnalysis::neutral());
}
