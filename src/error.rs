use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NoCandidate,
    Io,
    Internal,
}

/// Error returned by every fallible primer operation.
///
/// `InvalidInput` covers deterministic input problems (alphabet, lengths,
/// ranges); `NoCandidate` means a search exhausted its space for one strand.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct PrimerError {
    pub code: ErrorCode,
    pub message: String,
}

impl PrimerError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: message.into(),
        }
    }

    pub fn no_candidate(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::NoCandidate,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Io,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for PrimerError {
    fn from(err: std::io::Error) -> Self {
        PrimerError::io(err.to_string())
    }
}

impl From<serde_json::Error> for PrimerError {
    fn from(err: serde_json::Error) -> Self {
        PrimerError::invalid_input(format!("Malformed JSON: {err}"))
    }
}

pub type PrimerResult<T> = Result<T, PrimerError>;
