use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::Settings;
use crate::services::model::{Content, LanguageModel, ModelError, Part};

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Debug, Clone)]
pub(crate) struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GeminiClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = settings.ai().request_timeout();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().gemini_api_key.clone(),
            base_url: settings.ai().gemini_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().gemini_model.clone(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn transport_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Transport(err)
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, contents: &[Content]) -> Result<String, ModelError> {
        let payload = request_body(contents);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|err| self.transport_error(err))?;

        if !status.is_success() {
            return Err(ModelError::Api { status: status.as_u16(), body: raw_body });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&raw_body).map_err(|err| {
            ModelError::Decode(format!("{err}; body: {raw_body}"))
        })?;

        response_text(parsed)
    }
}

fn request_body(contents: &[Content]) -> Value {
    let contents: Vec<Value> = contents
        .iter()
        .map(|content| {
            let parts: Vec<Value> = content
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => json!({ "text": text }),
                    Part::InlineImage { mime_type, data } => json!({
                        "inlineData": {
                            "mimeType": mime_type,
                            "data": STANDARD.encode(data),
                        }
                    }),
                })
                .collect();
            json!({ "role": content.role, "parts": parts })
        })
        .collect();

    json!({ "contents": contents })
}

fn response_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(ModelError::Blocked(reason));
        }
        return Err(ModelError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if text.trim().is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|reason| reason != "STOP") {
            return Err(ModelError::Blocked(reason));
        }
        return Err(ModelError::EmptyResponse);
    }

    Ok(text)
}
