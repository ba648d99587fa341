use crate::error::{FintrackError, FintrackResult};
use validator::{Validate, ValidationErrors};

pub fn validate_model<T: Validate>(model: &T) -> FintrackResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let error_messages = format_validation_errors(&errors);
            Err(FintrackError::validation("model", error_messages))
        }
    }
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();
    collect_messages(errors, "", &mut messages);
    messages.join(", ")
}

fn collect_messages(errors: &ValidationErrors, prefix: &str, messages: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = match &*error.code {
                        "length" => format!("Length validation failed for field '{}'", path),
                        "range" => format!("Value out of range for field '{}'", path),
                        "required" => format!("Field '{}' is required", path),
                        code => format!("Validation failed for field '{}': {}", path, code),
                    };
                    messages.push(message);
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                collect_messages(nested, &path, messages);
            }
            validator::ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_messages(nested, &format!("{}[{}]", path, index), messages);
                }
            }
        }
    }
}

pub fn validate_file_type(file_name: &str, allowed_types: &[&str]) -> FintrackResult<()> {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    if !allowed_types.contains(&extension.to_lowercase().as_str()) {
        return Err(FintrackError::validation(
            "file_type",
            format!("File type '{}' not allowed. Allowed types: {}", extension, allowed_types.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_file_size(file_size: u64, max_size: u64) -> FintrackResult<()> {
    if file_size == 0 {
        return Err(FintrackError::validation("file_size", "File is empty"));
    }

    if file_size > max_size {
        return Err(FintrackError::validation(
            "file_size",
            format!("File size {} bytes exceeds maximum allowed size {} bytes", file_size, max_size),
        ));
    }

    Ok(())
}

pub fn validate_uuid(uuid_str: &str) -> FintrackResult<uuid::Uuid> {
    uuid::Uuid::parse_str(uuid_str.trim())
        .map_err(|_| FintrackError::validation("uuid", "Invalid UUID format"))
}
