use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::validator::ValidationReport;

/// Which rule class rejected an input payload.
///
/// Construction checks run in this order, so the first violated class
/// determines the reported kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaViolation {
    MissingField,
    InvalidFormat,
    OutOfRange,
    ForbiddenTerm,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingField => "missing field",
            Self::InvalidFormat => "invalid format",
            Self::OutOfRange => "out of range",
            Self::ForbiddenTerm => "forbidden term",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
pub enum MarketContextError {
    #[error("Schema error ({kind}) in '{field}': {details}")]
    Schema {
        kind: SchemaViolation,
        field: String,
        details: String,
    },

    #[error("Event detection skipped: {0}")]
    DetectionDegenerate(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Draft failed validation after repair: {}", report.summary())]
    ValidationFailure { report: ValidationReport },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl MarketContextError {
    pub(crate) fn schema(
        kind: SchemaViolation,
        field: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Schema {
            kind,
            field: field.into(),
            details: details.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Schema { .. } => ErrorCategory::SchemaError,
            Self::DetectionDegenerate(_) => ErrorCategory::DetectionDegenerate,
            Self::Transport(_) => ErrorCategory::TransportError,
            #[cfg(feature = "gemini")]
            Self::Http(_) => ErrorCategory::TransportError,
            Self::ValidationFailure { .. } => ErrorCategory::ValidationFailure,
            Self::Config(_) | Self::SerializationError(_) | Self::IoError(_) => {
                ErrorCategory::InternalError
            }
        }
    }
}

/// Machine-readable error category carried by failed service responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    SchemaError,
    DetectionDegenerate,
    TransportError,
    ValidationFailure,
    InternalError,
}

impl ErrorCategory {
    pub fn http_status(self) -> u16 {
        match self {
            Self::SchemaError => 400,
            // Never fatal; an empty event list is a normal outcome.
            Self::DetectionDegenerate => 200,
            Self::TransportError => 502,
            Self::ValidationFailure => 422,
            Self::InternalError => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketContextError>;
