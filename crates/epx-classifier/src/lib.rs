//! epx-classifier
//!
//! Boundary to the external text classifiers (semantic similarity and
//! AI-content detection). Real implementations sit behind two narrow async
//! traits so they can be swapped; the bundled one talks to a generative
//! language model over HTTP.
//!
//! Classifier failures never reach the integrity engine: the `*_or_neutral`
//! helpers turn any [`ClassifierError`] into a zeroed result and log it.

mod detection;
mod generative;
mod similarity;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub use detection::{detection_prompt, parse_detection_response, MIN_DETECTION_CHARS};
pub use epx_integrity::{AiBand, AiDetection};
pub use generative::{GenerativeClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use similarity::{parse_similarity_response, similarity_prompt, SimilarityAnalysis};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Upstream answered with a non-success status.
    #[error("classifier api error status={status}: {message}")]
    Api { status: u16, message: String },
    /// Upstream payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Missing or invalid configuration (e.g. API key).
    #[error("config error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Classifier traits
// ---------------------------------------------------------------------------

/// Compares two texts for semantic similarity / plagiarism risk.
#[async_trait]
pub trait SimilarityClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn compare(&self, text1: &str, text2: &str) -> Result<SimilarityAnalysis, ClassifierError>;
}

/// Estimates how likely an answer was produced by an AI model.
#[async_trait]
pub trait AiContentDetector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, text: &str) -> Result<AiDetection, ClassifierError>;
}

/// Similarity with classifier outages degraded to the neutral analysis.
pub async fn compare_or_neutral(
    classifier: &dyn SimilarityClassifier,
    text1: &str,
    text2: &str,
) -> SimilarityAnalysis {
    match classifier.compare(text1, text2).await {
        Ok(a) => a,
        Err(e) => {
            warn!(classifier = classifier.name(), error = %e, "similarity classifier unavailable; using neutral analysis");
            SimilarityAnalysis::neutral()
        }
    }
}

/// AI detection for one answer.
///
/// `None` when the text is too short to be worth classifying. Outages
/// degrade to [`AiDetection::neutral`], which carries no penalty.
pub async fn detect_or_neutral(detector: &dyn AiContentDetector, text: &str) -> Option<AiDetection> {
    if text.trim().chars().count() < MIN_DETECTION_CHARS {
        return None;
    }
    match detector.detect(text).await {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(detector = detector.name(), error = %e, "AI detector unavailable; using neutral result");
            Some(AiDetection::neutral())
        }
    }
}
