//! Stub inference for testing and offline mode

use async_trait::async_trait;
use carelead_domain::{Inference, InferenceError, InferenceRequest};

const CARE_TERMS: &[&str] = &[
    "caregiver",
    "caregiving",
    "home care",
    "pca",
    "companion",
    "homemaker",
    "home health",
    "aide",
    "dementia",
    "elderly",
    "senior",
];

const INTENT_TERMS: &[&str] = &[
    "looking for",
    "need help",
    "needs help",
    "recommend",
    "any suggestions",
    "hire",
];

const LOCAL_TERMS: &[&str] = &[
    "connecticut",
    "new haven",
    "hamden",
    "west haven",
    "east haven",
    "milford",
    "wallingford",
    "meriden",
    "branford",
    "waterbury",
];

/// Stub inference that returns configurable responses.
///
/// Without a configured response it applies a keyword heuristic to the post
/// section of the prompt and answers in the scoring JSON format.
pub struct StubInference {
    response: Option<String>,
    error: Option<InferenceError>,
}

impl StubInference {
    pub fn heuristic() -> Self {
        Self {
            response: None,
            error: None,
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            error: None,
        }
    }

    pub fn with_error(error: InferenceError) -> Self {
        Self {
            response: None,
            error: Some(error),
        }
    }
}

impl Default for StubInference {
    fn default() -> Self {
        Self::heuristic()
    }
}

#[async_trait]
impl Inference for StubInference {
    async fn infer(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Some(response) = &self.response {
            return Ok(response.clone());
        }

        let post = post_section(&request.prompt).to_lowercase();
        let hits = |terms: &[&str]| terms.iter().filter(|t| post.contains(*t)).count();
        let care = hits(CARE_TERMS);
        let intent = hits(INTENT_TERMS);
        let local = hits(LOCAL_TERMS);

        let mut score = 0u32;
        if care > 0 {
            score += 40 + 10 * (care.min(2) as u32 - 1);
        }
        if intent > 0 {
            score += 20;
        }
        if local > 0 {
            score += 30;
        }
        let score = score.min(100);

        Ok(serde_json::json!({
            "confidence_score": score,
            "reason": format!(
                "Stub heuristic: {} care, {} intent, {} location term(s)",
                care, intent, local
            ),
        })
        .to_string())
    }
}

/// The text between the post heading and the output format heading
fn post_section(prompt: &str) -> &str {
    let start = prompt
        .find("## Post\n")
        .map(|i| i + "## Post\n".len())
        .unwrap_or(0);
    let rest = &prompt[start..];
    let end = rest.find("## Output Format").unwrap_or(rest.len());
    &rest[..end]
}
