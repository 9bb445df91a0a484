//! Custom error types for the imputation pipeline.
//!
//! Structural and input errors propagate to the caller with enough context
//! (line, attribute, record) to diagnose them. Numerical degeneracies such as
//! singular covariance matrices are recovered locally and never show up here.
//!
//! Errors are serializable so they can be emitted as JSON by the CLI.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the imputation pipeline.
#[derive(Error, Debug)]
pub enum ImputationError {
    /// Pipeline was cancelled through its cancellation token.
    #[error("Imputation cancelled")]
    Cancelled,

    /// Attribute was not found in the schema.
    #[error("Attribute '{0}' not found in dataset")]
    AttributeNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Attribute metadata could not be parsed.
    #[error("Malformed attribute metadata at line {line}: {reason}")]
    MalformedMetadata { line: usize, reason: String },

    /// A data line could not be parsed.
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// A line carried the wrong number of tokens.
    #[error("Line {line} has {found} values but {expected} attributes are declared")]
    AttributeCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A token of a numeric attribute is not a number.
    #[error("Line {line}: value '{token}' of numeric attribute '{attribute}' is not a number")]
    UnparsableNumber {
        line: usize,
        attribute: String,
        token: String,
    },

    /// A rule line could not be parsed.
    #[error("Invalid rule at line {line}: {reason}")]
    InvalidRule { line: usize, reason: String },

    /// Operation needs at least one record.
    #[error("Dataset has no records")]
    EmptyDataset,

    /// Bisection for the pessimistic error rate could not bracket a root.
    #[error(
        "Failed to bracket the pessimistic error rate for {errors} errors in {records} records (CF = {confidence})"
    )]
    BisectionFailed {
        records: usize,
        errors: usize,
        confidence: f64,
    },

    /// Imputation of an attribute failed.
    #[error("Failed to impute missing values in attribute '{attribute}': {reason}")]
    ImputationFailed { attribute: String, reason: String },

    /// Internal error (e.g., a tree invariant was violated).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ImputationError>,
    },
}

impl ImputationError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ImputationError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code, preserved through added context.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::AttributeNotFound(_) => "ATTRIBUTE_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::MalformedMetadata { .. } => "MALFORMED_METADATA",
            Self::MalformedRecord { .. } => "MALFORMED_RECORD",
            Self::AttributeCountMismatch { .. } => "ATTRIBUTE_COUNT_MISMATCH",
            Self::UnparsableNumber { .. } => "UNPARSABLE_NUMBER",
            Self::InvalidRule { .. } => "INVALID_RULE",
            Self::EmptyDataset => "EMPTY_DATASET",
            Self::BisectionFailed { .. } => "BISECTION_FAILED",
            Self::ImputationFailed { .. } => "IMPUTATION_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is caused by user input rather than a fault in the library.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidConfig(_)
            | Self::AttributeNotFound(_)
            | Self::MalformedMetadata { .. }
            | Self::MalformedRecord { .. }
            | Self::AttributeCountMismatch { .. }
            | Self::UnparsableNumber { .. }
            | Self::InvalidRule { .. }
            | Self::EmptyDataset => true,
            Self::WithContext { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ImputationError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ImputationError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for imputation operations.
pub type Result<T> = std::result::Result<T, ImputationError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ImputationError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ImputationError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(ImputationError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            ImputationError::AttributeNotFound("age".to_string()).error_code(),
            "ATTRIBUTE_NOT_FOUND"
        );
        assert_eq!(
            ImputationError::BisectionFailed {
                records: 10,
                errors: 2,
                confidence: 0.25
            }
            .error_code(),
            "BISECTION_FAILED"
        );
    }

    #[test]
    fn test_is_cancelled_through_context() {
        assert!(ImputationError::Cancelled.is_cancelled());
        assert!(
            ImputationError::Cancelled
                .with_context("While imputing record 3")
                .is_cancelled()
        );
        assert!(!ImputationError::EmptyDataset.is_cancelled());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(ImputationError::EmptyDataset.is_recoverable());
        assert!(
            ImputationError::AttributeCountMismatch {
                line: 3,
                expected: 4,
                found: 3
            }
            .is_recoverable()
        );
        assert!(!ImputationError::Internal("broken arena".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_serialization() {
        let error = ImputationError::UnparsableNumber {
            line: 7,
            attribute: "income".to_string(),
            token: "abc".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("UNPARSABLE_NUMBER"));
        assert!(json.contains("income"));
        assert!(json.contains("line 7"));
    }

    #[test]
    fn test_with_context() {
        let error = ImputationError::AttributeNotFound("age".to_string())
            .with_context("While building trees");
        assert!(error.to_string().contains("While building trees"));
        assert_eq!(error.error_code(), "ATTRIBUTE_NOT_FOUND");
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(ImputationError::EmptyDataset);
        let err = result.context("Loading data.txt").unwrap_err();
        assert_eq!(err.to_string(), "Loading data.txt: Dataset has no records");
    }
}
