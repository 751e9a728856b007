use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::services::model::{Conversation, ModelError, ModelGateway};
use crate::services::prompts::{comparison_prompt, FEEDBACK_SYSTEM_INSTRUCTION};
use crate::services::sessions::SessionStore;

#[derive(Debug, Error)]
pub(crate) enum ChatError {
    #[error("Invalid session ID")]
    SessionNotFound,
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Server-side state of one tutoring thread: the live conversation plus the
/// documents and first feedback it was opened with.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) struct ChatSession {
    conversation: Conversation,
    teacher_script: String,
    student_script: String,
    initial_feedback: String,
    created_at: Instant,
}

impl ChatSession {
    pub(crate) fn new(
        conversation: Conversation,
        teacher_script: &str,
        student_script: &str,
        initial_feedback: &str,
    ) -> Self {
        Self {
            conversation,
            teacher_script: teacher_script.to_string(),
            student_script: student_script.to_string(),
            initial_feedback: initial_feedback.to_string(),
            created_at: Instant::now(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct FeedbackChat {
    gateway: ModelGateway,
    sessions: Arc<dyn SessionStore<ChatSession>>,
}

impl FeedbackChat {
    pub(crate) fn new(gateway: ModelGateway, sessions: Arc<dyn SessionStore<ChatSession>>) -> Self {
        Self { gateway, sessions }
    }

    /// Opens a conversation primed with the tutoring instruction and returns
    /// the first feedback together with the new session id. Nothing is stored
    /// unless both model calls succeed.
    pub(crate) async fn compare(
        &self,
        teacher_script: &str,
        student_script: &str,
    ) -> Result<(String, String), ChatError> {
        let mut conversation = self.gateway.start_conversation();
        conversation.send(FEEDBACK_SYSTEM_INSTRUCTION).await?;
        let feedback = conversation.send(&comparison_prompt(teacher_script, student_script)).await?;

        let session =
            ChatSession::new(conversation, teacher_script, student_script, &feedback);
        let session_id = self.sessions.create(session).await;
        tracing::info!(session_id = %session_id, "Chat session created");

        Ok((feedback, session_id))
    }

    /// Follow-up on an existing session. Messages on the same session are
    /// handled one at a time.
    pub(crate) async fn continue_chat(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<String, ChatError> {
        let handle = self.sessions.get(session_id).await.ok_or(ChatError::SessionNotFound)?;
        let mut session = handle.lock().await;

        let reply = session.conversation.send(message).await?;
        tracing::debug!(
            session_id,
            turns = session.conversation.history().len(),
            "Chat message answered"
        );

        Ok(reply)
    }
}
