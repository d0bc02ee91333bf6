//! Error types for the booking host.

use park_reservations_core::config::ConfigError;
use park_reservations_core::error::{ErrorCategory, ErrorPayload, ReservationError};
use thiserror::Error;

/// Errors surfaced by the command-line host.
#[derive(Debug, Error)]
pub enum AppError {
    /// A `PARK_*` rule variable was malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The request file or stdin could not be read.
    #[error("Failed to read request: {0}")]
    Io(#[from] std::io::Error),

    /// The request was not valid booking JSON.
    #[error("Malformed request JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The engine rejected the request or storage failed.
    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

impl AppError {
    /// Process exit code: 1 for anything the caller can fix, 2 for infrastructure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Json(_) | Self::Reservation(ReservationError::Rejected(_)) => 1,
            Self::Config(_) | Self::Io(_) | Self::Reservation(ReservationError::Temporary(_)) => 2,
        }
    }

    /// Failure payload printed on stdout.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::Reservation(error) => error.to_payload(),
            Self::Json(error) => ErrorPayload {
                code: "MALFORMED_REQUEST".to_string(),
                message: error.to_string(),
                category: ErrorCategory::Validation,
            },
            Self::Config(_) | Self::Io(_) => ErrorPayload {
                code: "HOST_ERROR".to_string(),
                message: self.to_string(),
                category: ErrorCategory::Temporary,
            },
        }
    }
}
