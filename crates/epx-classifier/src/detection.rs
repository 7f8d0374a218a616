use epx_integrity::AiDetection;
use serde::Deserialize;

use crate::similarity::{extract_json_object, pct};

/// Answers shorter than this are not sent for AI detection.
pub const MIN_DETECTION_CHARS: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDetection {
    ai_likelihood: Option<f64>,
    confidence: Option<f64>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    flags: Vec<String>,
}

/// Decode a model reply into an [`AiDetection`]; unparseable replies become
/// [`AiDetection::neutral`].
pub fn parse_detection_response(text: &str) -> AiDetection {
    let parsed = extract_json_object(text).and_then(|obj| serde_json::from_str::<RawDetection>(obj).ok());
    match parsed {
        Some(raw) => AiDetection {
            ai_likelihood: pct(raw.ai_likelihood) as f64,
            confidence: pct(raw.confidence) as f64,
            explanation: raw.explanation,
            flags: raw.flags,
        },
        None => AiDetection::neutral(),
    }
}

pub fn detection_prompt(text: &str) -> String {
    format!(
        r#"Estimate how likely the following exam answer was written by an AI language model rather than a student:

Answer: "{text}"

Consider uniformity of tone, generic phrasing, unusual fluency for the context, and absence of personal reasoning.

Respond in JSON format: {{
  "aiLikelihood": number (0-100),
  "confidence": number (0-100),
  "explanation": "short explanation",
  "flags": ["list of indicators"]
}}"#
    )
}
