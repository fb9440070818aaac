//! Error types for the model engine

use thiserror::Error;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model engine errors
///
/// Loading is atomic: any of these aborts the load and no partial model is
/// ever returned. Per-record validation findings during bulk ingest are not
/// errors of this type; see [`crate::validate`].
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Schema violation at {location}: {message}")]
    SchemaViolation { location: String, message: String },

    #[error("Corrupt archive ({member}): {message}")]
    CorruptArchive { member: String, message: String },

    #[error("Unknown {kind} reference '{name}' (referenced from {referrer})")]
    UnknownReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Column conflict on {concept}.{column}: {message}")]
    ColumnConflict {
        concept: String,
        column: String,
        message: String,
    },

    #[error("Cycle in CV '{cv}' parent relation involving term '{term}'")]
    CvCycle { cv: String, term: String },

    #[error("Term '{key}' not found in CV '{cv}'")]
    CvTermNotFound { cv: String, key: String },

    #[error("CV '{cv}' is unresolved (URI-referenced content was not fetched)")]
    CvUnresolved { cv: String },

    #[error("Invalid pattern '{name}': {message}")]
    PatternInvalid { name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error on {target}: {message}")]
    Backend { target: String, message: String },
}

impl ModelError {
    /// Schema violation helper with a path-style location
    pub fn schema(location: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::SchemaViolation {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Corrupt-archive helper naming the offending member
    pub fn corrupt(member: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::CorruptArchive {
            member: member.into(),
            message: message.into(),
        }
    }
}
