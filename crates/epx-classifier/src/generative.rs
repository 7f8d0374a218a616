use async_trait::async_trait;
use epx_integrity::AiDetection;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::detection::{detection_prompt, parse_detection_response};
use crate::similarity::{parse_similarity_response, similarity_prompt};
use crate::{AiContentDetector, ClassifierError, SimilarityAnalysis, SimilarityClassifier};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-pro";

/// Generative-language-model backed classifier.
///
/// API key is read by the caller (daemon/CLI) and passed in; do not log it.
#[derive(Debug, Clone)]
pub struct GenerativeClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl GenerativeClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// One prompt in, the first candidate's text out.
    async fn generate(&self, prompt: &str) -> Result<String, ClassifierError> {
        if self.api_key.is_empty() {
            return Err(ClassifierError::Config("classifier api key is empty".to_string()));
        }

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .http
            .post(self.build_generate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;

        let text = decoded
            .first_text()
            .ok_or_else(|| ClassifierError::Decode("response carried no candidate text".to_string()))?;
        debug!(model = %self.model, chars = text.len(), "classifier reply received");
        Ok(text)
    }
}

#[async_trait]
impl SimilarityClassifier for GenerativeClient {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn compare(&self, text1: &str, text2: &str) -> Result<SimilarityAnalysis, ClassifierError> {
        let reply = self.generate(&similarity_prompt(text1, text2)).await?;
        Ok(parse_similarity_response(&reply))
    }
}

#[async_trait]
impl AiContentDetector for GenerativeClient {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn detect(&self, text: &str) -> Result<AiDetection, ClassifierError> {
        let reply = self.generate(&detection_prompt(text)).await?;
        Ok(parse_detection_response(&reply))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}
