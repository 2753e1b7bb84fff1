use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Why a callback was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    #[error("syntax error")]
    SyntaxError,
    #[error("forbidden function")]
    ForbiddenFunction,
    #[error("forbidden content")]
    ForbiddenContent,
    #[error("undefined function")]
    UndefinedFunction,
}

/// Outcome of validating one `callback_ref` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationVerdict {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ValidationErrorKind>,
    pub message: String,
}

impl ValidationVerdict {
    pub fn passed() -> Self {
        Self {
            ok: true,
            error_kind: None,
            message: "Code is valid".to_string(),
        }
    }

    pub fn failed(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error_kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn syntax_error(parser_message: impl std::fmt::Display) -> Self {
        Self::failed(
            ValidationErrorKind::SyntaxError,
            format!("Syntax error: {}", parser_message),
        )
    }

    pub fn forbidden_function(name: &str) -> Self {
        Self::failed(
            ValidationErrorKind::ForbiddenFunction,
            format!("Forbidden function \"{}\"", name),
        )
    }

    pub fn forbidden_content(tag: &str) -> Self {
        Self::failed(
            ValidationErrorKind::ForbiddenContent,
            format!("Forbidden content: <{}> markup in string literal", tag),
        )
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::failed(
            ValidationErrorKind::UndefinedFunction,
            format!("Undefined function \"{}\"", name),
        )
    }

    /// The error text persisted as `validation_errors`, `None` for a passing verdict.
    pub fn error_text(&self) -> Option<String> {
        (!self.ok).then(|| self.message.clone())
    }
}
