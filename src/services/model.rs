use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Part {
    Text(String),
    InlineImage { mime_type: String, data: Vec<u8> },
}

/// One turn of a request to the model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Content {
    pub(crate) role: Role,
    pub(crate) parts: Vec<Part>,
}

impl Content {
    pub(crate) fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![Part::Text(text.into())] }
    }

    pub(crate) fn model_text(text: impl Into<String>) -> Self {
        Self { role: Role::Model, parts: vec![Part::Text(text.into())] }
    }

    pub(crate) fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                Part::InlineImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Error)]
pub(crate) enum ModelError {
    #[error("failed to call the language model API: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("language model API error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("language model blocked the prompt: {0}")]
    Blocked(String),
    #[error("language model returned an empty response")]
    EmptyResponse,
    #[error("failed to decode language model response: {0}")]
    Decode(String),
    #[error("language model did not respond within {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl ModelError {
    pub(crate) fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    fn outcome_label(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Api { .. } => "api_error",
            Self::Blocked(_) => "blocked",
            Self::EmptyResponse => "empty",
            Self::Decode(_) => "decode_error",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// A generative model that turns a list of turns into a text reply.
#[async_trait]
pub(crate) trait LanguageModel: Send + Sync {
    async fn generate(&self, contents: &[Content]) -> Result<String, ModelError>;
}

/// Entry point for every external model call. Applies the request timeout
/// and records call metrics.
#[derive(Clone)]
pub(crate) struct ModelGateway {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl ModelGateway {
    pub(crate) fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Single-shot prompt completion.
    pub(crate) async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        self.call("completion", &[Content::user_text(prompt)]).await
    }

    /// Image-grounded request: the image goes first, followed by the instruction.
    pub(crate) async fn read_image(
        &self,
        image: Vec<u8>,
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, ModelError> {
        let content = Content {
            role: Role::User,
            parts: vec![
                Part::InlineImage { mime_type: mime_type.to_string(), data: image },
                Part::Text(prompt.to_string()),
            ],
        };
        self.call("image_extraction", &[content]).await
    }

    pub(crate) fn start_conversation(&self) -> Conversation {
        Conversation { gateway: self.clone(), history: Vec::new() }
    }

    async fn call(&self, operation: &'static str, contents: &[Content]) -> Result<String, ModelError> {
        let timer = Instant::now();
        let prompt_chars: usize = contents.iter().map(|content| content.text().len()).sum();
        tracing::debug!(
            operation,
            turns = contents.len(),
            prompt_chars,
            "Sending language model request"
        );

        let result = match tokio::time::timeout(self.timeout, self.model.generate(contents)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout(self.timeout)),
        };

        let elapsed = timer.elapsed().as_secs_f64();
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.outcome_label(),
        };
        metrics::counter!("model_requests_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("model_request_duration_seconds", "operation" => operation)
            .record(elapsed);

        match &result {
            Ok(reply) => tracing::info!(
                operation,
                duration_seconds = elapsed,
                reply_chars = reply.len(),
                "Language model request completed"
            ),
            Err(err) => tracing::warn!(
                operation,
                duration_seconds = elapsed,
                error = %err,
                "Language model request failed"
            ),
        }

        result
    }
}

/// Multi-turn conversation. The whole history is resent on every message.
pub(crate) struct Conversation {
    gateway: ModelGateway,
    history: Vec<Content>,
}

impl Conversation {
    /// Sends `message` and records both sides of the exchange. A failed call
    /// leaves the history untouched.
    pub(crate) async fn send(&mut self, message: &str) -> Result<String, ModelError> {
        let mut contents = self.history.clone();
        contents.push(Content::user_text(message));

        let reply = self.gateway.call("conversation", &contents).await?;

        contents.push(Content::model_text(reply.clone()));
        self.history = contents;
        Ok(reply)
    }

    pub(crate) fn history(&self) -> &[Content] {
        &self.history
    }
}
