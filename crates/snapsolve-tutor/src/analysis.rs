//! The tutoring contract with the analysis service.
//!
//! Holds the structured result type, the fixed prompt texts, the response
//! schema sent with every request, and decoding of the service's output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AnalysisError;
use crate::image::ImageData;

/// System instruction establishing the tutor persona.
pub const TUTOR_PERSONA: &str = "You are a helpful, encouraging, and expert academic tutor. \
Your goal is to help students understand, not just give answers. \
Keep explanations clear and concise.";

/// Instruction sent alongside every homework image.
pub const ANALYSIS_INSTRUCTION: &str = "Analyze this homework problem. \
Identify the subject, the specific topic, and provide a step-by-step solution. \
Then, explain the core concept simply. \
Finally, generate 3 practice questions based on the same concept.";

/// Number of practice questions the instruction asks for.
pub const EXPECTED_PRACTICE_QUESTIONS: usize = 3;

/// A practice question on the same concept as the submitted problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeQuestion {
    /// The question text.
    pub question: String,
    /// The expected answer.
    pub answer: String,
    /// Optional nudge toward the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Structured tutoring response for one homework image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Academic subject, e.g. "Math".
    pub subject: String,
    /// Specific topic, e.g. "Linear Equations".
    pub topic: String,
    /// An emoji representing the subject.
    pub emoji: String,
    /// Ordered solution steps. Never empty.
    pub steps: Vec<String>,
    /// Short explanation of the underlying concept.
    pub explanation: String,
    /// Practice questions, normally three.
    pub practice_questions: Vec<PracticeQuestion>,
}

/// Something that can turn a homework image into a tutoring result.
///
/// Implementations make exactly one external call per invocation.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyzes one image.
    async fn analyze(&self, image: &ImageData) -> Result<AnalysisResult, AnalysisError>;
}

/// Builds the response schema in the analysis service's schema dialect.
#[must_use]
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "subject": {
                "type": "STRING",
                "description": "The academic subject (e.g., Math, Chemistry)."
            },
            "topic": {
                "type": "STRING",
                "description": "The specific topic (e.g., Calculus, Stoichiometry)."
            },
            "emoji": {
                "type": "STRING",
                "description": "A relevant emoji for the subject."
            },
            "steps": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Step-by-step solution to the problem in the image."
            },
            "explanation": {
                "type": "STRING",
                "description": "A short, clear paragraph explaining the underlying concept."
            },
            "practiceQuestions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "question": { "type": "STRING" },
                        "answer": { "type": "STRING" },
                        "hint": { "type": "STRING" }
                    },
                    "required": ["question", "answer"]
                }
            }
        },
        "required": ["subject", "topic", "emoji", "steps", "explanation", "practiceQuestions"]
    })
}

/// Decodes the service's response text into an [`AnalysisResult`].
///
/// # Errors
///
/// Returns `AnalysisError::EmptyResponse` for blank text and
/// `AnalysisError::MalformedResponse` when the JSON does not match the
/// schema or carries no solution steps.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let result: AnalysisResult =
        serde_json::from_str(text).map_err(|e| AnalysisError::malformed(e.to_string()))?;

    if result.steps.is_empty() {
        return Err(AnalysisError::malformed("response contains no solution steps"));
    }

    if result.practice_questions.len() != EXPECTED_PRACTICE_QUESTIONS {
        tracing::warn!(
            expected = EXPECTED_PRACTICE_QUESTIONS,
            actual = result.practice_questions.len(),
            "Unexpected number of practice questions"
        );
    }

    Ok(result)
}
