use crate::models::{TransferRequest, ValidatedRequest};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

/// Why a request was rejected, plus the filename when it is trustworthy
/// enough to record a status against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRejection {
    pub reason: String,
    pub filename: Option<String>,
}

/// Checks that a name is a bare file name that can be joined onto both the
/// staging directory and the remote upload directory.
pub fn validate_filename(raw: &str) -> Result<String, String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err("filename は必須です".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("ファイル名 '{}' は使用できません", name));
    }
    if name.contains(['/', '\\']) {
        return Err(format!("ファイル名 '{}' にパス区切り文字は使用できません", name));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err("ファイル名に制御文字は使用できません".to_string());
    }
    Ok(name.to_string())
}

fn rule_error(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}

/// `#[validate(custom)]` rule for the filename field
pub fn bare_filename(value: &str) -> Result<(), ValidationError> {
    validate_filename(value)
        .map(|_| ())
        .map_err(|reason| rule_error("bare_filename", reason))
}

/// `#[validate(custom)]` rule for the account field
pub fn non_blank_account(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(rule_error("non_blank", "account は必須です".to_string()));
    }
    Ok(())
}

fn first_message(errors: &ValidationErrors, field: &str) -> Option<String> {
    let field_errors = errors.field_errors();
    let first = field_errors.get(field)?.first()?;
    Some(
        first
            .message
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("{} is invalid", field)),
    )
}

pub fn validate_request(request: &TransferRequest) -> Result<ValidatedRequest, RequestRejection> {
    let trimmed = |v: &Option<String>| v.as_deref().unwrap_or("").trim().to_string();

    if let Err(errors) = request.validate() {
        if let Some(reason) = first_message(&errors, "filename") {
            return Err(RequestRejection {
                reason,
                filename: None,
            });
        }
        let reason = first_message(&errors, "account").unwrap_or_else(|| errors.to_string());
        return Err(RequestRejection {
            reason,
            filename: Some(trimmed(&request.filename)),
        });
    }

    Ok(ValidatedRequest {
        account: trimmed(&request.account),
        filename: trimmed(&request.filename),
    })
}
