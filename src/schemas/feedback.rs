use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct CompareRequest {
    #[serde(default, rename = "teacherScript")]
    #[validate(length(min = 1, message = "Both teacher and student scripts are required"))]
    pub(crate) teacher_script: String,
    #[serde(default, rename = "studentScript")]
    #[validate(length(min = 1, message = "Both teacher and student scripts are required"))]
    pub(crate) student_script: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CompareResponse {
    pub(crate) feedback: String,
    #[serde(rename = "sessionId")]
    pub(crate) session_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ChatRequest {
    #[serde(default, rename = "sessionId")]
    #[validate(length(min = 1, message = "Session ID and message are required"))]
    pub(crate) session_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Session ID and message are required"))]
    pub(crate) message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    pub(crate) message: String,
}
