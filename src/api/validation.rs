use validator::ValidationErrors;

use crate::api::errors::ApiError;
use crate::schemas::evaluation::ScriptFormat;
use crate::services::uploads::file_extension;

const DOCUMENT_EXTENSIONS: [&str; 2] = ["txt", "json"];

/// Checks an uploaded file against the combined allow-list and returns its
/// lowercased extension.
pub(crate) fn validate_upload_extension(
    field: &str,
    filename: &str,
    image_extensions: &[String],
) -> Result<String, ApiError> {
    let invalid = || ApiError::BadRequest(format!("Invalid file type for {field}"));
    let extension = file_extension(filename).ok_or_else(invalid)?;

    let allowed = DOCUMENT_EXTENSIONS.contains(&extension.as_str())
        || image_extensions.iter().any(|allowed| allowed == &extension);
    if allowed {
        Ok(extension)
    } else {
        Err(invalid())
    }
}

pub(crate) fn validate_script_extension(
    format: ScriptFormat,
    extension: &str,
    image_extensions: &[String],
) -> Result<(), ApiError> {
    match format {
        ScriptFormat::Handwritten => {
            if image_extensions.iter().any(|allowed| allowed == extension) {
                Ok(())
            } else {
                let listed = image_extensions
                    .iter()
                    .map(|ext| format!(".{ext}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(ApiError::BadRequest(format!(
                    "Handwritten scripts must be image files ({listed})"
                )))
            }
        }
        ScriptFormat::Digital if extension == "json" => Ok(()),
        ScriptFormat::Digital => {
            Err(ApiError::BadRequest("Digital scripts must be JSON files".to_string()))
        }
    }
}

pub(crate) fn validate_teacher_key_extension(extension: &str) -> Result<(), ApiError> {
    if extension == "txt" {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Teacher keys must be .txt files".to_string()))
    }
}

pub(crate) fn validate_marking_scheme_extension(extension: &str) -> Result<(), ApiError> {
    if extension == "json" {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Marking schemes must be JSON files".to_string()))
    }
}

/// First human-readable message of a failed `validator` check.
pub(crate) fn first_validation_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errors| errors.iter())
        .find_map(|error| error.message.as_ref().map(|message| message.to_string()))
        .unwrap_or_else(|| errors.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    fn message(err: ApiError) -> String {
        match err {
            ApiError::BadRequest(message) => message,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn upload_extension_accepts_documents_and_images() {
        assert_eq!(validate_upload_extension("teacher_key", "key.TXT", &images()).unwrap(), "txt");
        assert_eq!(validate_upload_extension("student_script", "a.jpeg", &images()).unwrap(), "jpeg");
        assert_eq!(
            message(validate_upload_extension("marking_scheme", "scheme.pdf", &images()).unwrap_err()),
            "Invalid file type for marking_scheme"
        );
        assert_eq!(
            message(validate_upload_extension("teacher_key", "noext", &images()).unwrap_err()),
            "Invalid file type for teacher_key"
        );
    }

    #[test]
    fn script_extension_must_match_format() {
        assert!(validate_script_extension(ScriptFormat::Handwritten, "png", &images()).is_ok());
        assert_eq!(
            message(validate_script_extension(ScriptFormat::Handwritten, "json", &images()).unwrap_err()),
            "Handwritten scripts must be image files (.jpg, .jpeg, .png)"
        );
        assert!(validate_script_extension(ScriptFormat::Digital, "json", &images()).is_ok());
        assert_eq!(
            message(validate_script_extension(ScriptFormat::Digital, "txt", &images()).unwrap_err()),
            "Digital scripts must be JSON files"
        );
    }

    #[test]
    fn key_and_scheme_extensions_are_fixed() {
        assert!(validate_teacher_key_extension("txt").is_ok());
        assert_eq!(
            message(validate_teacher_key_extension("json").unwrap_err()),
            "Teacher keys must be .txt files"
        );
        assert!(validate_marking_scheme_extension("json").is_ok());
        assert_eq!(
            message(validate_marking_scheme_extension("txt").unwrap_err()),
            "Marking schemes must be JSON files"
        );
    }
}
