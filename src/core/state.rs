use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::evaluation::EvaluationWorkflow;
use crate::services::feedback_chat::{ChatSession, FeedbackChat};
use crate::services::model::ModelGateway;
use crate::services::sessions::SessionStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    evaluation: EvaluationWorkflow,
    feedback_chat: FeedbackChat,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        gateway: ModelGateway,
        sessions: Arc<dyn SessionStore<ChatSession>>,
    ) -> Self {
        let evaluation =
            EvaluationWorkflow::new(gateway.clone(), settings.storage().result_path.clone());
        let feedback_chat = FeedbackChat::new(gateway, sessions);
        Self { inner: Arc::new(InnerState { settings, evaluation, feedback_chat }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn evaluation(&self) -> &EvaluationWorkflow {
        &self.inner.evaluation
    }

    pub(crate) fn feedback_chat(&self) -> &FeedbackChat {
        &self.inner.feedback_chat
    }
}
