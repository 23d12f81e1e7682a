//! Gemini `generateContent` client.
//!
//! Sends one homework image per call together with the tutor persona, the
//! analysis instruction and the response schema, then decodes the first
//! candidate's text with [`parse_analysis`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::analysis::{
    parse_analysis, response_schema, AnalysisResult, Analyzer, ANALYSIS_INSTRUCTION, TUTOR_PERSONA,
};
use crate::config::Config;
use crate::error::{AnalysisError, Result, ServiceErrorKind, TutorError};
use crate::image::ImageData;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Analysis client backed by the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Creates a client against the default API base URL.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::HttpClient` if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TutorError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: crate::config::DEFAULT_API_BASE_URL.to_string(),
        })
    }

    /// Creates a client from configuration, reading the API key from the
    /// configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::MissingApiKey` if the key is not set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;
        Ok(
            Self::new(api_key, &config.model, config.request_timeout_duration())?
                .with_base_url(&config.api_base_url),
        )
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The model this client targets.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_request(&self, body: &GenerateContentRequest) -> std::result::Result<String, AnalysisError> {
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let body_text = response.text().await.map_err(map_transport_error)?;
        if body_text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body_text).map_err(|e| {
            AnalysisError::malformed(format!("Failed to parse Gemini response: {e}"))
        })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl Analyzer for GeminiClient {
    async fn analyze(&self, image: &ImageData) -> std::result::Result<AnalysisResult, AnalysisError> {
        let request = build_request(image);

        tracing::debug!(
            model = %self.model,
            media_type = image.media_type(),
            size_bytes = image.size_bytes(),
            "Sending image to Gemini"
        );

        let text = self.send_request(&request).await?;
        parse_analysis(&text)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn build_request(image: &ImageData) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part::Text {
                text: TUTOR_PERSONA.to_string(),
            }],
        },
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![
                Part::InlineData {
                    inline_data: InlineDataPayload {
                        mime_type: image.media_type().to_string(),
                        data: image.to_base64(),
                    },
                },
                Part::Text {
                    text: ANALYSIS_INSTRUCTION.to_string(),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: response_schema(),
        },
    }
}

/// Concatenates the text parts of the first candidate.
fn extract_text_response(response: GenerateContentResponse) -> std::result::Result<String, AnalysisError> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    Ok(text)
}

fn map_transport_error(err: reqwest::Error) -> AnalysisError {
    let kind = if err.is_timeout() {
        ServiceErrorKind::Timeout
    } else if err.is_connect() {
        ServiceErrorKind::Network
    } else {
        ServiceErrorKind::Other
    };
    AnalysisError::service(kind, format!("Gemini API request failed: {err}"))
}

fn map_http_error(status: StatusCode, body: &str) -> AnalysisError {
    let message = serde_json::from_str::<ErrorWrapper>(body).map_or_else(
        |_| body.to_string(),
        |wrapper| {
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(status_text) if !status_text.is_empty() => format!("{status_text}: {msg}"),
                _ => msg,
            }
        },
    );

    AnalysisError::service(
        ServiceErrorKind::from_status(status.as_u16()),
        format!("HTTP {}: {message}", status.as_u16()),
    )
}
