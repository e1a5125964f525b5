use crate::Error;
use thiserror::Error;

/// Failures raised by this layer.
///
/// Errors travel as [`anyhow::Error`]; use `error.downcast_ref::<KeelError>()`
/// to classify them. Context attached on top (for example a rollback failure
/// chained to the original error) does not hide the variant.
#[derive(Error, Debug)]
pub enum KeelError {
    /// Malformed or incomplete connection parameters, detected before any driver call.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The driver or the database rejected an operation.
    #[error("Driver error: {message}")]
    Driver {
        message: String,
        /// Driver specific result or state code, when known.
        code: Option<i32>,
    },

    /// One or more commands of a batch failed.
    #[error("Batch error: {message}")]
    Batch {
        message: String,
        /// Counts of the commands that completed, `None` when the driver cannot tell.
        counts: Option<Vec<u64>>,
    },

    /// A nested transaction was requested while savepoints were disabled.
    #[error("Savepoints explicitly disabled, cannot start a nested transaction")]
    NestedTransactionDisabled,

    /// A result cursor was used after its statement and cursor were released.
    #[error("The cursor is closed")]
    ClosedCursor,
}

impl KeelError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Error naming a required connection parameter that is missing.
    pub fn missing_parameter(name: &str) -> Self {
        Self::Configuration {
            message: format!("missing required parameter `{}`", name),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            code: None,
        }
    }

    pub fn driver_code(message: impl Into<String>, code: i32) -> Self {
        Self::Driver {
            message: message.into(),
            code: Some(code),
        }
    }

    pub fn batch(message: impl Into<String>, counts: Option<Vec<u64>>) -> Self {
        Self::Batch {
            message: message.into(),
            counts,
        }
    }
}

/// Returns the `KeelError` carried by `error`, if any.
pub fn error_kind(error: &Error) -> Option<&KeelError> {
    error.downcast_ref::<KeelError>()
}

/// Keeps `original` as the reported failure and chains the `cleanup` failure to it.
pub fn chain_cleanup(original: Error, cleanup: Error, action: &str) -> Error {
    log::error!("Failure while {}: {:#}", action, cleanup);
    original.context(format!("additionally failed while {}: {:#}", action, cleanup))
}
