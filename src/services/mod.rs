pub(crate) mod evaluation;
pub(crate) mod feedback_chat;
pub(crate) mod gemini;
pub(crate) mod model;
pub(crate) mod model_output;
pub(crate) mod prompts;
pub(crate) mod sessions;
pub(crate) mod uploads;
