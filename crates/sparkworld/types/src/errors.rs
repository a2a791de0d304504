//! Error types for the Spark-World data layer

use crate::action::Intent;
use thiserror::Error;

/// Errors raised while building or validating Spark-World values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparkWorldError {
    /// An identifier string could not be parsed
    #[error("Invalid {kind} id: '{value}'")]
    InvalidId {
        /// Which id family was being parsed
        kind: &'static str,
        /// The offending input
        value: String,
    },

    /// An intent keyword was not recognised
    #[error("Unknown intent: '{0}'")]
    UnknownIntent(String),

    /// An action payload could not be decoded
    #[error("Malformed action payload: {0}")]
    MalformedPayload(String),

    /// An action is missing a field its intent requires
    #[error("Action '{intent}' is missing required field '{field}'")]
    MissingField {
        /// Intent of the offending action
        intent: Intent,
        /// Name of the missing field
        field: &'static str,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SparkWorldError {
    /// True for errors that make an action unusable (treated as a lost turn)
    pub fn is_malformed_action(&self) -> bool {
        matches!(
            self,
            Self::UnknownIntent(_) | Self::MalformedPayload(_) | Self::MissingField { .. }
        )
    }
}

/// Result type for Spark-World data operations
pub type SparkWorldResult<T> = Result<T, SparkWorldError>;
