//! Gemini client for frame inspection.
//!
//! Sends one JPEG plus the inspection instruction to `generateContent`,
//! trying each configured model in order until one answers.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::{ClassificationError, VisionModel};
use crate::error::{WorkerError, WorkerResult};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-pro"];

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Models tried in order for each frame
    pub models: Vec<String>,
    pub base_url: String,
    /// HTTP timeout for one model call
    pub request_timeout: Duration,
}

const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_FRAME_TIMEOUT,
        }
        .with_frame_timeout(DEFAULT_FRAME_TIMEOUT)
    }

    /// Split the per-frame budget evenly across the fallback models so a
    /// hung model leaves time for the next one.
    pub fn with_frame_timeout(mut self, frame_timeout: Duration) -> Self {
        let models = self.models.len().max(1) as u32;
        self.request_timeout = frame_timeout / models;
        self
    }

    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| WorkerError::config_error("GEMINI_API_KEY not set"))?;

        let mut config = Self::new(api_key);

        if let Ok(models) = std::env::var("GEMINI_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
            if !models.is_empty() {
                config.models = models;
            }
        }
        if let Ok(base_url) = std::env::var("GEMINI_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().trim_end_matches('/').to_string();
            }
        }
        let frame_timeout = std::env::var("CLASSIFY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FRAME_TIMEOUT);

        Ok(config.with_frame_timeout(frame_timeout))
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    InlineData { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    /// Base64-encoded image
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini API client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("lg-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn models(&self) -> &[String] {
        &self.config.models
    }

    async fn call_model(
        &self,
        model: &str,
        request: &GeminiRequest,
    ) -> Result<String, ClassificationError> {
        let url = format!("{}/models/{}:generateContent", self.config.base_url, model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassificationError::Timeout(self.config.request_timeout)
                } else {
                    ClassificationError::transport(format!("Gemini API request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassificationError::transport(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let body: GeminiResponse = response.json().await.map_err(|e| {
            ClassificationError::Malformed(format!("Failed to parse Gemini response: {}", e))
        })?;

        body.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ClassificationError::EmptyResponse)
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn describe_image(
        &self,
        image: &[u8],
        prompt: &str,
    ) -> Result<String, ClassificationError> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: base64::engine::general_purpose::STANDARD.encode(image),
                        },
                    },
                    Part::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let mut last_error = None;
        for model in &self.config.models {
            match self.call_model(model, &request).await {
                Ok(text) => {
                    debug!(model = %model, "Gemini answered");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(model = %model, "Gemini model failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ClassificationError::transport("No Gemini models configured")))
    }
}
