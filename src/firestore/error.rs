use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirestoreErrorCode {
    InvalidArgument,
    InvalidPathKind,
    SerializationMismatch,
    EvictedReferenceHandle,
    RemoteWriteFailure,
    NotFound,
    Internal,
    Unavailable,
    Cancelled,
}

impl FirestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirestoreErrorCode::InvalidArgument => "firestore/invalid-argument",
            FirestoreErrorCode::InvalidPathKind => "firestore/invalid-path-kind",
            FirestoreErrorCode::SerializationMismatch => "firestore/serialization-mismatch",
            FirestoreErrorCode::EvictedReferenceHandle => "firestore/evicted-reference-handle",
            FirestoreErrorCode::RemoteWriteFailure => "firestore/remote-write-failure",
            FirestoreErrorCode::NotFound => "firestore/not-found",
            FirestoreErrorCode::Internal => "firestore/internal",
            FirestoreErrorCode::Unavailable => "firestore/unavailable",
            FirestoreErrorCode::Cancelled => "firestore/cancelled",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FirestoreError {
    pub code: FirestoreErrorCode,
    message: String,
}

impl FirestoreError {
    pub fn new(code: FirestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for FirestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for FirestoreError {}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

pub fn invalid_argument(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidArgument, message)
}

pub fn invalid_path_kind(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidPathKind, message)
}

pub fn serialization_mismatch(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::SerializationMismatch, message)
}

pub fn evicted_reference_handle(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::EvictedReferenceHandle, message)
}

pub fn remote_write_failure(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::RemoteWriteFailure, message)
}

pub fn internal_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::NotFound, message)
}

pub fn unavailable(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Unavailable, message)
}

pub fn cancelled(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Cancelled, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = invalid_path_kind("users is not a document");
        assert_eq!(
            err.to_string(),
            "users is not a document (firestore/invalid-path-kind)"
        );
        assert_eq!(err.code, FirestoreErrorCode::InvalidPathKind);
    }

    #[test]
    fn evicted_handle_diagnostic_has_its_own_code() {
        let err = evicted_reference_handle("startAfter cursor dropped");
        assert_eq!(err.code_str(), "firestore/evicted-reference-handle");
    }
}
