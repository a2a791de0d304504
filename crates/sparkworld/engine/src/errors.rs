//! Error types for Tick Engine operations

use sparkworld_types::errors::SparkWorldError;
use sparkworld_types::ids::AgentId;
use thiserror::Error;

/// Errors that can occur in engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Error from the types layer
    #[error(transparent)]
    Types(#[from] SparkWorldError),

    /// Agent not found
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// Agent registration failed
    #[error("Failed to register agent '{name}': {reason}")]
    RegistrationFailed {
        /// Display name of the rejected agent
        name: String,
        /// Why registration failed
        reason: String,
    },

    /// An external capability failed
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl EngineError {
    /// Check if this came from a malformed action payload
    pub fn is_malformed_action(&self) -> bool {
        match self {
            Self::Types(e) => e.is_malformed_action(),
            Self::Oracle(e) => e.is_malformed_action(),
            _ => false,
        }
    }
}

/// Failure of an external capability call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The call did not finish within the configured timeout
    #[error("Oracle call timed out")]
    Timeout,

    /// The capability reported a failure
    #[error("Oracle call failed: {0}")]
    Failed(String),

    /// The capability answered with an unusable action
    #[error(transparent)]
    InvalidAction(#[from] SparkWorldError),
}

impl OracleError {
    /// The oracle answered, but with an action that cannot be used
    pub fn is_malformed_action(&self) -> bool {
        matches!(self, Self::InvalidAction(e) if e.is_malformed_action())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
