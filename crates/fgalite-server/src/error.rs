use fgalite_core::engine::CheckError;
use fgalite_core::model::{JsonModelError, ParseError, TupleValidationError, ValidationError};
use fgalite_core::tuple::{StoreId, TupleParseError};
use fgalite_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("check error: {0}")]
    Check(#[from] CheckError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Json(#[from] JsonModelError),

    #[error("{0}")]
    TupleParse(#[from] TupleParseError),

    #[error("authorization model validation errors: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("invalid tuple: {0}")]
    TupleValidation(#[from] TupleValidationError),

    #[error("store {0} has no authorization model")]
    NoAuthorizationModel(StoreId),
}

/// Coarse error class carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    NotFound,
    AlreadyExists,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::Internal => "internal_error",
        }
    }
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::Parse(_)
            | ApiError::Json(_)
            | ApiError::TupleParse(_)
            | ApiError::Validation(_)
            | ApiError::TupleValidation(_)
            | ApiError::Check(CheckError::TypeNotFound(_))
            | ApiError::Check(CheckError::RelationNotFound { .. })
            | ApiError::Storage(StorageError::DuplicateInBatch(_))
            | ApiError::Storage(StorageError::SnapshotAhead { .. })
            | ApiError::Storage(StorageError::SnapshotExpired { .. }) => ErrorCode::Validation,
            ApiError::NoAuthorizationModel(_)
            | ApiError::Storage(StorageError::StoreNotFound(_))
            | ApiError::Storage(StorageError::ModelNotFound(_))
            | ApiError::Storage(StorageError::TupleNotFound(_)) => ErrorCode::NotFound,
            ApiError::Storage(StorageError::TupleAlreadyExists(_)) => ErrorCode::AlreadyExists,
            ApiError::Check(CheckError::StorageError(_))
            | ApiError::Storage(StorageError::Internal(_)) => ErrorCode::Internal,
        }
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_from_check_error() {
        let api_err: ApiError = CheckError::TypeNotFound("document".to_string()).into();

        assert!(
            api_err.to_string().contains("document"),
            "expected 'document' in error message, got: {api_err}"
        );
        assert_eq!(api_err.code(), ErrorCode::Validation);
    }

    #[test]
    fn api_error_from_storage_error() {
        let api_err: ApiError =
            StorageError::TupleAlreadyExists("doc:1#viewer@user:a".into()).into();

        assert!(
            api_err.to_string().contains("already exists"),
            "expected 'already exists' in error message, got: {api_err}"
        );
        assert_eq!(api_err.code(), ErrorCode::AlreadyExists);
    }

    #[test]
    fn api_error_from_parse_error() {
        let api_err: ApiError = ParseError::MixedOperators.into();

        assert!(
            api_err.to_string().contains("mixed operators"),
            "expected 'mixed operators' in error message, got: {api_err}"
        );
        assert_eq!(api_err.code(), ErrorCode::Validation);
    }

    #[test]
    fn api_error_validation_formats_multiple_errors() {
        let errors = vec![
            ValidationError::TooManyTypes {
                count: 60,
                limit: 50,
            },
            ValidationError::DuplicateType("folder".to_string()),
        ];
        let msg = ApiError::Validation(errors).to_string();

        assert!(msg.contains("60"), "should contain count 60: {msg}");
        assert!(msg.contains("folder"), "should contain type name: {msg}");
        assert!(msg.contains("; "), "errors should be joined: {msg}");
    }

    #[test]
    fn missing_things_are_not_found() {
        let store_id = StoreId::generate();
        assert_eq!(
            ApiError::NoAuthorizationModel(store_id).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            ApiError::from(StorageError::StoreNotFound("s".into())).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            ApiError::from(StorageError::TupleNotFound("t".into())).code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn storage_failures_are_internal() {
        let err = ApiError::from(CheckError::StorageError("disk on fire".into()));
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.code().as_str(), "internal_error");
    }
}
