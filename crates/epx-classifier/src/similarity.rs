use serde::{Deserialize, Serialize};

/// Fallback text when a model reply carries no decodable analysis.
const UNPARSEABLE: &str = "Unable to parse similarity analysis";

/// Similarity verdict for a pair of texts. All scores are percentages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityAnalysis {
    pub similarity_score: u8,
    pub semantic_similarity: u8,
    pub structural_similarity: u8,
    pub vocabulary_overlap: u8,
    pub plagiarism_risk: u8,
    pub analysis: String,
    pub shared_concepts: Vec<String>,
    pub unique_elements: Vec<String>,
}

impl SimilarityAnalysis {
    /// All-zero, empty analysis used whenever the classifier cannot answer.
    pub fn neutral() -> Self {
        Self {
            analysis: UNPARSEABLE.to_string(),
            ..Self::default()
        }
    }
}

/// Lenient mirror of the model's JSON: numbers may be floats or missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSimilarity {
    similarity_score: Option<f64>,
    semantic_similarity: Option<f64>,
    structural_similarity: Option<f64>,
    vocabulary_overlap: Option<f64>,
    plagiarism_risk: Option<f64>,
    #[serde(default)]
    analysis: String,
    #[serde(default)]
    shared_concepts: Vec<String>,
    #[serde(default)]
    unique_elements: Vec<String>,
}

pub(crate) fn pct(v: Option<f64>) -> u8 {
    v.filter(|x| x.is_finite())
        .map(|x| x.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

/// Slice from the first `{` to the last `}` (models often wrap JSON in prose
/// or code fences).
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Decode a model reply. Never fails: anything unparseable becomes
/// [`SimilarityAnalysis::neutral`].
pub fn parse_similarity_response(text: &str) -> SimilarityAnalysis {
    let Some(obj) = extract_json_object(text) else {
        return SimilarityAnalysis::neutral();
    };
    match serde_json::from_str::<RawSimilarity>(obj) {
        Ok(raw) => SimilarityAnalysis {
            similarity_score: pct(raw.similarity_score),
            semantic_similarity: pct(raw.semantic_similarity),
            structural_similarity: pct(raw.structural_similarity),
            vocabulary_overlap: pct(raw.vocabulary_overlap),
            plagiarism_risk: pct(raw.plagiarism_risk),
            analysis: raw.analysis,
            shared_concepts: raw.shared_concepts,
            unique_elements: raw.unique_elements,
        },
        Err(_) => SimilarityAnalysis::neutral(),
    }
}

pub fn similarity_prompt(text1: &str, text2: &str) -> String {
    format!(
        r#"Compare these two texts for semantic similarity and potential plagiarism:

Text 1: "{text1}"

Text 2: "{text2}"

Analyze for:
1. Semantic similarity (meaning and concepts)
2. Structural similarity (organization and flow)
3. Vocabulary overlap
4. Unique ideas vs shared concepts
5. Potential plagiarism indicators

Provide a similarity score from 0-100 and detailed analysis.

Respond in JSON format: {{
  "similarityScore": number,
  "semanticSimilarity": number,
  "structuralSimilarity": number,
  "vocabularyOverlap": number,
  "plagiarismRisk": number,
  "analysis": "detailed explanation",
  "sharedConcepts": ["list of shared ideas"],
  "uniqueElements": ["list of unique aspects in each text"]
}}"#
    )
}
