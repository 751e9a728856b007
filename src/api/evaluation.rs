use std::collections::HashMap;
use std::path::PathBuf;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    routing::post,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::validation::{
    validate_marking_scheme_extension, validate_script_extension, validate_teacher_key_extension,
    validate_upload_extension,
};
use crate::core::config::Settings;
use crate::core::state::AppState;
use crate::schemas::evaluation::{
    EvaluateResponse, EvaluationMode, EvaluationResult, ScriptFormat,
};
use crate::services::evaluation::{EvaluationError, EvaluationInputs};
use crate::services::uploads::UploadBatch;

const STUDENT_SCRIPT: &str = "student_script";
const TEACHER_KEY: &str = "teacher_key";
const MARKING_SCHEME: &str = "marking_scheme";
const FILE_FIELDS: [&str; 3] = [STUDENT_SCRIPT, TEACHER_KEY, MARKING_SCHEME];

/// Headroom for form fields and multipart framing on top of the file limits.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub(crate) fn router(settings: &Settings) -> Router<AppState> {
    let per_file = settings.storage().max_upload_bytes();
    let body_limit = per_file.saturating_mul(FILE_FIELDS.len() as u64) + FORM_OVERHEAD_BYTES;
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new().route("/evaluate", post(evaluate)).layer(DefaultBodyLimit::max(body_limit))
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct EvaluationForm {
    evaluation_type: Option<String>,
    format_type: Option<String>,
    files: HashMap<&'static str, UploadedFile>,
}

struct ValidatedFile {
    field: &'static str,
    file: UploadedFile,
}

struct ValidatedForm {
    mode: EvaluationMode,
    format: ScriptFormat,
    student_script: ValidatedFile,
    teacher_key: ValidatedFile,
    marking_scheme: ValidatedFile,
}

async fn evaluate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let mut multipart = multipart.map_err(|err| ApiError::BadRequest(err.body_text()))?;
    let storage = state.settings().storage();

    let form = read_form(&mut multipart, storage.max_upload_bytes(), storage.max_upload_size_mb)
        .await?;
    let form = validate_form(form, &storage.allowed_image_extensions)?;

    tracing::info!(
        mode = form.mode.as_str(),
        format = form.format.as_str(),
        "Evaluation request accepted"
    );

    let batch = UploadBatch::create(&storage.upload_dir)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to prepare upload directory"))?;
    tracing::debug!(dir = %batch.dir().display(), "Upload directory prepared");
    let outcome = run_in_batch(&state, &batch, form).await;
    batch.cleanup().await;

    let result = outcome?;
    Ok(Json(EvaluateResponse { success: true, result }))
}

async fn run_in_batch(
    state: &AppState,
    batch: &UploadBatch,
    form: ValidatedForm,
) -> Result<EvaluationResult, ApiError> {
    let student_script = store(batch, &form.student_script).await?;
    let teacher_key = store(batch, &form.teacher_key).await?;
    let marking_scheme = store(batch, &form.marking_scheme).await?;

    let inputs = EvaluationInputs {
        mode: form.mode,
        format: form.format,
        student_script,
        teacher_key,
        marking_scheme,
    };

    state.evaluation().run(&inputs).await.map_err(evaluation_error)
}

async fn store(batch: &UploadBatch, upload: &ValidatedFile) -> Result<PathBuf, ApiError> {
    batch
        .store(upload.field, &upload.file.filename, &upload.file.bytes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save uploaded file"))
}

fn evaluation_error(err: EvaluationError) -> ApiError {
    match &err {
        EvaluationError::Model(model) if model.is_timeout() => {
            ApiError::GatewayTimeout(model.to_string())
        }
        _ => {
            tracing::error!(error = %err, "Evaluation failed");
            ApiError::with_traceback(&err)
        }
    }
}

async fn read_form(
    multipart: &mut Multipart,
    max_bytes: u64,
    max_size_mb: u64,
) -> Result<EvaluationForm, ApiError> {
    let too_large = || ApiError::BadRequest(format!("File size exceeds {max_size_mb}MB limit"));
    let multipart_error = |err: MultipartError, fallback: &str| {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            ApiError::BadRequest(fallback.to_string())
        }
    };

    let mut form = EvaluationForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, "Invalid multipart data"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "evaluation_type" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err, "Invalid evaluation_type"))?;
                form.evaluation_type = Some(text);
            }
            "format_type" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| multipart_error(err, "Invalid format_type"))?;
                form.format_type = Some(text);
            }
            _ => {
                let Some(key) = FILE_FIELDS.iter().copied().find(|key| *key == name) else {
                    continue;
                };
                let filename = field.file_name().unwrap_or("").to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|err| multipart_error(err, "Failed to read file"))?
                {
                    let next_size = bytes.len() as u64 + chunk.len() as u64;
                    if next_size > max_bytes {
                        return Err(too_large());
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.files.insert(key, UploadedFile { filename, bytes });
            }
        }
    }

    Ok(form)
}

fn validate_form(
    mut form: EvaluationForm,
    image_extensions: &[String],
) -> Result<ValidatedForm, ApiError> {
    let evaluation_type = form
        .evaluation_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::BadRequest("evaluation_type is required".to_string()))?;
    let mode = EvaluationMode::parse(evaluation_type).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid evaluation_type '{evaluation_type}'; expected omr, descriptive or mixed"
        ))
    })?;

    let format_type = form
        .format_type
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("handwritten");
    let format = ScriptFormat::parse(format_type).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid format_type '{format_type}'; expected handwritten or digital"
        ))
    })?;

    let mut extensions = HashMap::new();
    for field in FILE_FIELDS {
        let file = form
            .files
            .get(field)
            .ok_or_else(|| ApiError::BadRequest(format!("{field} file is required")))?;
        if file.filename.trim().is_empty() || file.bytes.is_empty() {
            return Err(ApiError::BadRequest(format!("{field} file is empty")));
        }
        let extension = validate_upload_extension(field, &file.filename, image_extensions)?;
        extensions.insert(field, extension);
    }

    validate_script_extension(format, &extensions[STUDENT_SCRIPT], image_extensions)?;
    validate_teacher_key_extension(&extensions[TEACHER_KEY])?;
    validate_marking_scheme_extension(&extensions[MARKING_SCHEME])?;

    let mut take = |field: &'static str| -> Result<ValidatedFile, ApiError> {
        let file = form
            .files
            .remove(field)
            .ok_or_else(|| ApiError::BadRequest(format!("{field} file is required")))?;
        Ok(ValidatedFile { field, file })
    };

    Ok(ValidatedForm {
        mode,
        format,
        student_script: take(STUDENT_SCRIPT)?,
        teacher_key: take(TEACHER_KEY)?,
        marking_scheme: take(MARKING_SCHEME)?,
    })
}
