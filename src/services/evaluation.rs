use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::schemas::evaluation::{
    DetailedFeedback, DetailedScore, EvaluationMode, EvaluationResult, FeedbackSheet, ScoreSheet,
    ScriptFormat,
};
use crate::services::model::{ModelError, ModelGateway};
use crate::services::model_output::{extract_json_payload, PayloadError};
use crate::services::prompts::{evaluation_prompt, STUDENT_EXTRACTION_PROMPT};
use crate::services::uploads::file_extension;

const OMR_PLACEHOLDER_ID: &str = "OMR_DUMMY_001";

#[derive(Debug, Error)]
pub(crate) enum EvaluationError {
    #[error("failed to read {what}: {source}")]
    Io {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("student script is not valid JSON: {0}")]
    InvalidStudentScript(#[source] serde_json::Error),
    #[error("student script must be a JSON object")]
    StudentScriptNotObject,
    #[error("teacher key is not valid UTF-8 text")]
    InvalidTeacherKey(#[source] std::string::FromUtf8Error),
    #[error("marking scheme is not valid JSON: {0}")]
    InvalidMarkingScheme(#[source] serde_json::Error),
    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to parse JSON from the model response: {0}")]
    Payload(#[from] PayloadError),
    #[error("The model response did not contain the expected 'scores' and 'feedback' keys")]
    MissingResultKeys,
    #[error("model response has an unexpected shape: {0}")]
    UnexpectedResultShape(#[source] serde_json::Error),
}

/// Validated request inputs; the files already live in the request's upload
/// directory.
#[derive(Debug, Clone)]
pub(crate) struct EvaluationInputs {
    pub(crate) mode: EvaluationMode,
    pub(crate) format: ScriptFormat,
    pub(crate) student_script: PathBuf,
    pub(crate) teacher_key: PathBuf,
    pub(crate) marking_scheme: PathBuf,
}

#[derive(Clone)]
pub(crate) struct EvaluationWorkflow {
    gateway: ModelGateway,
    result_path: PathBuf,
}

impl EvaluationWorkflow {
    pub(crate) fn new(gateway: ModelGateway, result_path: PathBuf) -> Self {
        Self { gateway, result_path }
    }

    pub(crate) async fn run(
        &self,
        inputs: &EvaluationInputs,
    ) -> Result<EvaluationResult, EvaluationError> {
        if inputs.mode == EvaluationMode::Omr {
            tracing::info!("OMR evaluation is a placeholder; returning canned result");
            metrics::counter!("evaluations_total", "mode" => inputs.mode.as_str()).increment(1);
            return Ok(omr_placeholder());
        }

        let student_script = match inputs.format {
            ScriptFormat::Handwritten => self.extract_handwritten(&inputs.student_script).await?,
            ScriptFormat::Digital => load_digital_script(&inputs.student_script).await?,
        };
        let teacher_key = load_teacher_key(&inputs.teacher_key).await?;
        let scheme = load_marking_scheme(&inputs.marking_scheme).await?;

        let prompt = evaluation_prompt(&teacher_key, &student_script, &scheme);
        let reply = self.gateway.complete(&prompt).await?;
        let payload = extract_json_payload(&reply).inspect_err(|err| {
            tracing::warn!(raw = err.raw(), "Model reply did not contain a JSON payload");
        })?;
        let result = parse_result(payload)?;

        if !result.scores.is_consistent() {
            tracing::warn!(
                total = %result.scores.total_score_awarded,
                detail_sum = result.scores.awarded_sum(),
                "Reported total does not match the per-question marks"
            );
        }

        self.persist(&result).await;
        metrics::counter!("evaluations_total", "mode" => inputs.mode.as_str()).increment(1);
        tracing::info!(
            mode = inputs.mode.as_str(),
            format = inputs.format.as_str(),
            total = %result.scores.total_score_awarded,
            "Evaluation completed"
        );

        Ok(result)
    }

    async fn extract_handwritten(&self, path: &Path) -> Result<Value, EvaluationError> {
        let mime_type = image_mime_type(path)?;
        let image = tokio::fs::read(path)
            .await
            .map_err(|source| EvaluationError::Io { what: "student script", source })?;

        tracing::info!(bytes = image.len(), mime_type, "Extracting answers from handwritten script");
        let reply = self.gateway.read_image(image, mime_type, STUDENT_EXTRACTION_PROMPT).await?;
        let extracted = extract_json_payload(&reply)?;
        if !extracted.is_object() {
            return Err(EvaluationError::StudentScriptNotObject);
        }
        Ok(extracted)
    }

    async fn persist(&self, result: &EvaluationResult) {
        let body = match serde_json::to_string_pretty(result) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize evaluation result");
                return;
            }
        };

        if let Some(parent) = self.result_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                tracing::error!(error = %err, path = %parent.display(), "Failed to create result directory");
                return;
            }
        }

        match tokio::fs::write(&self.result_path, body).await {
            Ok(()) => tracing::debug!(path = %self.result_path.display(), "Evaluation result saved"),
            Err(err) => tracing::error!(
                error = %err,
                path = %self.result_path.display(),
                "Failed to save evaluation result"
            ),
        }
    }
}

fn parse_result(value: Value) -> Result<EvaluationResult, EvaluationError> {
    let has_key = |key: &str| value.get(key).is_some_and(|v| !v.is_null());
    if !has_key("scores") || !has_key("feedback") {
        return Err(EvaluationError::MissingResultKeys);
    }
    serde_json::from_value(value).map_err(EvaluationError::UnexpectedResultShape)
}

async fn load_digital_script(path: &Path) -> Result<Value, EvaluationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| EvaluationError::Io { what: "student script", source })?;
    serde_json::from_slice(&bytes).map_err(EvaluationError::InvalidStudentScript)
}

/// Plain text, trimmed. A key that holds a JSON document is re-indented so
/// the prompt stays readable.
async fn load_teacher_key(path: &Path) -> Result<String, EvaluationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| EvaluationError::Io { what: "teacher key", source })?;
    let text = String::from_utf8(bytes).map_err(EvaluationError::InvalidTeacherKey)?;
    let trimmed = text.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return Ok(pretty);
            }
        }
    }
    Ok(trimmed.to_string())
}

async fn load_marking_scheme(path: &Path) -> Result<Value, EvaluationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| EvaluationError::Io { what: "marking scheme", source })?;
    serde_json::from_slice(&bytes).map_err(EvaluationError::InvalidMarkingScheme)
}

fn image_mime_type(path: &Path) -> Result<&'static str, EvaluationError> {
    let name = path.to_string_lossy();
    match file_extension(&name).as_deref() {
        Some("jpg" | "jpeg") => Ok("image/jpeg"),
        Some("png") => Ok("image/png"),
        Some("webp") => Ok("image/webp"),
        other => Err(EvaluationError::UnsupportedImage(other.unwrap_or_default().to_string())),
    }
}

fn omr_placeholder() -> EvaluationResult {
    let bubbles = [
        (1, 1, "Correct bubble selected."),
        (2, 0, "Incorrect bubble selected."),
        (3, 1, "Correct bubble selected."),
    ];

    EvaluationResult {
        scores: ScoreSheet {
            student_id: Some(OMR_PLACEHOLDER_ID.to_string()),
            total_score_awarded: Number::from(18),
            detailed_scores: bubbles
                .iter()
                .map(|(question, awarded, _)| DetailedScore {
                    question_number: Number::from(*question),
                    max_marks: Number::from(1),
                    marks_awarded: Number::from(*awarded),
                    extra: Map::new(),
                })
                .collect(),
            extra: Map::new(),
        },
        feedback: FeedbackSheet {
            student_id: Some(OMR_PLACEHOLDER_ID.to_string()),
            summary_feedback: "OMR sheet evaluated with dummy data. Actual logic coming soon."
                .to_string(),
            detailed_feedback: bubbles
                .iter()
                .map(|(question, _, feedback)| DetailedFeedback {
                    question_number: Number::from(*question),
                    feedback: feedback.to_string(),
                    extra: Map::new(),
                })
                .collect(),
            extra: Map::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::services::model::Part;
    use crate::test_support::{scratch_dir, StubModel};

    struct Fixture {
        dir: PathBuf,
        stub: Arc<StubModel>,
        workflow: EvaluationWorkflow,
    }

    impl Fixture {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            let dir = scratch_dir();
            std::fs::create_dir_all(&dir).expect("scratch dir");
            let stub = StubModel::with_replies(replies);
            let gateway = ModelGateway::new(stub.clone(), Duration::from_secs(5));
            let workflow = EvaluationWorkflow::new(gateway, dir.join("result.json"));
            Self { dir, stub, workflow }
        }

        fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.dir.join(name);
            std::fs::write(&path, contents).expect("write fixture");
            path
        }

        fn inputs(&self, mode: EvaluationMode, format: ScriptFormat, script: PathBuf) -> EvaluationInputs {
            EvaluationInputs {
                mode,
                format,
                student_script: script,
                teacher_key: self.write("key.txt", b"  1. Photosynthesis converts light to energy.\n"),
                marking_scheme: self.write(
                    "scheme.json",
                    br#"{"questions": [{"question_number": 1, "max_marks": 5}]}"#,
                ),
            }
        }

        fn result_path(&self) -> PathBuf {
            self.dir.join("result.json")
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn model_result() -> Value {
        json!({
            "scores": {
                "student_id": "S-1",
                "total_score_awarded": 4,
                "detailed_scores": [{"question_number": 1, "max_marks": 5, "marks_awarded": 4}]
            },
            "feedback": {
                "student_id": "S-1",
                "summary_feedback": "Good grasp of the basics.",
                "detailed_feedback": [{"question_number": 1, "feedback": "Missing chlorophyll."}]
            }
        })
    }

    fn fenced(value: &Value) -> String {
        format!("```json\n{}\n```", serde_json::to_string_pretty(value).expect("json"))
    }

    #[tokio::test]
    async fn omr_returns_placeholder_without_model_calls() {
        let fixture = Fixture::new(Vec::new());
        let inputs = EvaluationInputs {
            mode: EvaluationMode::Omr,
            format: ScriptFormat::Handwritten,
            student_script: fixture.dir.join("missing.png"),
            teacher_key: fixture.dir.join("missing.txt"),
            marking_scheme: fixture.dir.join("missing.json"),
        };

        let result = fixture.workflow.run(&inputs).await.expect("omr result");

        assert!(fixture.stub.calls().is_empty());
        assert_eq!(result.scores.student_id.as_deref(), Some(OMR_PLACEHOLDER_ID));
        assert_eq!(result.scores.total_score_awarded, Number::from(18));
        assert_eq!(result.scores.detailed_scores.len(), 3);
        assert_eq!(result.feedback.detailed_feedback[1].feedback, "Incorrect bubble selected.");
        assert!(!fixture.result_path().exists());
    }

    #[tokio::test]
    async fn digital_script_is_scored_and_persisted() {
        let fixture = Fixture::new(vec![Ok(fenced(&model_result()))]);
        let script = fixture.write(
            "student.json",
            br#"{"answers": [{"question_number": 1, "answer_text": "Plants eat light"}]}"#,
        );
        let inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Digital, script);

        let result = fixture.workflow.run(&inputs).await.expect("result");

        assert_eq!(serde_json::to_value(&result).expect("value"), model_result());

        let calls = fixture.stub.calls();
        assert_eq!(calls.len(), 1);
        let prompt = calls[0][0].text();
        assert!(prompt.contains("1. Photosynthesis converts light to energy."));
        assert!(prompt.contains("Plants eat light"));
        assert!(prompt.contains("\"max_marks\": 5"));

        let saved = std::fs::read(fixture.result_path()).expect("saved result");
        let saved: Value = serde_json::from_slice(&saved).expect("saved json");
        assert_eq!(saved, model_result());
    }

    #[tokio::test]
    async fn missing_feedback_key_is_rejected_and_not_persisted() {
        let fixture = Fixture::new(vec![Ok(fenced(&json!({"scores": {"total_score_awarded": 1}})))]);
        let script = fixture.write("student.json", br#"{"answers": []}"#);
        let inputs = fixture.inputs(EvaluationMode::Mixed, ScriptFormat::Digital, script);

        let err = fixture.workflow.run(&inputs).await.unwrap_err();

        assert!(matches!(err, EvaluationError::MissingResultKeys));
        assert_eq!(
            err.to_string(),
            "The model response did not contain the expected 'scores' and 'feedback' keys"
        );
        assert!(!fixture.result_path().exists());
    }

    #[tokio::test]
    async fn null_scores_count_as_missing() {
        let fixture =
            Fixture::new(vec![Ok(json!({"scores": null, "feedback": {}}).to_string())]);
        let script = fixture.write("student.json", br#"{"answers": []}"#);
        let inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Digital, script);

        let err = fixture.workflow.run(&inputs).await.unwrap_err();

        assert!(matches!(err, EvaluationError::MissingResultKeys));
    }

    #[tokio::test]
    async fn handwritten_script_is_extracted_then_scored() {
        let extraction = json!({
            "student_details": {"name": "Ada", "student_id": "S-1"},
            "questions_attempted": [1],
            "answers": [{"question_number": 1, "answer_text": "Light becomes sugar"}]
        });
        let fixture =
            Fixture::new(vec![Ok(fenced(&extraction)), Ok(fenced(&model_result()))]);
        let script = fixture.write("page.PNG", &[0x89, 0x50, 0x4e, 0x47]);
        let inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Handwritten, script);

        fixture.workflow.run(&inputs).await.expect("result");

        let calls = fixture.stub.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0][0].parts[0],
            Part::InlineImage { mime_type: "image/png".to_string(), data: vec![0x89, 0x50, 0x4e, 0x47] }
        );
        assert_eq!(calls[0][0].parts[1], Part::Text(STUDENT_EXTRACTION_PROMPT.to_string()));
        assert!(calls[1][0].text().contains("Light becomes sugar"));
    }

    #[tokio::test]
    async fn handwritten_extraction_must_be_an_object() {
        let fixture = Fixture::new(vec![Ok("[1, 2, 3]".to_string())]);
        let script = fixture.write("page.jpg", &[1, 2, 3]);
        let inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Handwritten, script);

        let err = fixture.workflow.run(&inputs).await.unwrap_err();

        assert!(matches!(err, EvaluationError::StudentScriptNotObject));
        assert_eq!(fixture.stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn json_teacher_key_is_reindented() {
        let fixture = Fixture::new(vec![Ok(fenced(&model_result()))]);
        let script = fixture.write("student.json", br#"{"answers": []}"#);
        let mut inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Digital, script);
        inputs.teacher_key = fixture.write("key.txt", br#"{"1":"Photosynthesis"}"#);

        fixture.workflow.run(&inputs).await.expect("result");

        let prompt = fixture.stub.calls()[0][0].text();
        assert!(prompt.contains("{\n  \"1\": \"Photosynthesis\"\n}"));
    }

    #[tokio::test]
    async fn malformed_digital_script_fails_before_model_call() {
        let fixture = Fixture::new(Vec::new());
        let script = fixture.write("student.json", b"{not json");
        let inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Digital, script);

        let err = fixture.workflow.run(&inputs).await.unwrap_err();

        assert!(matches!(err, EvaluationError::InvalidStudentScript(_)));
        assert!(fixture.stub.calls().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_propagated() {
        let fixture = Fixture::new(vec![Err(ModelError::EmptyResponse)]);
        let script = fixture.write("student.json", br#"{"answers": []}"#);
        let inputs = fixture.inputs(EvaluationMode::Descriptive, ScriptFormat::Digital, script);

        let err = fixture.workflow.run(&inputs).await.unwrap_err();

        assert!(matches!(err, EvaluationError::Model(ModelError::EmptyResponse)));
        assert!(!fixture.result_path().exists());
    }
}
