//! Error types for the blehost library
//!
//! Only local precondition failures are reported through [`BleError`]. Outcomes
//! of over-the-air procedures (pairing failures, encryption failures, timeouts)
//! are delivered as events instead.

use thiserror::Error;

/// Errors returned synchronously by the GAP manager, Security Manager and
/// security database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    /// A parameter is out of range, refers to an unknown object, or a bounded
    /// resource has no room left.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The connection handle does not name a live connection.
    #[error("Invalid connection handle")]
    InvalidHandle,

    /// The request conflicts with an operation that is still in progress.
    #[error("Operation not permitted")]
    OperationNotPermitted,

    /// The controller or this host does not support the feature.
    #[error("Not implemented")]
    NotImplemented,

    /// The component has not been initialised or is in the wrong state.
    #[error("Invalid state for operation")]
    InvalidState,

    /// The platform abstraction layer rejected a command.
    #[error("PAL error: {0}")]
    Pal(String),
}

impl BleError {
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        BleError::InvalidParameter(what.into())
    }
}

/// Result type used throughout the library
pub type BleResult<T> = Result<T, BleError>;
