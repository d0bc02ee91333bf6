//! # Park Booking
//!
//! Command-line host for the park reservation engine. Reads booking requests as
//! camelCase JSON, runs them through the coordinator against `PostgreSQL`, and prints
//! a JSON envelope on stdout. Logs go to stderr.
//!
//! ```text
//! park-booking migrate
//! park-booking provision Palestra 18-10-2025 16:00 5
//! park-booking reserve request.json
//! park-booking availability Palestra 18-10-2025 [16:00]
//! park-booking registrations Palestra 18-10-2025 16:00
//! ```

pub mod config;
pub mod error;

pub use config::Config;
pub use error::AppError;

use park_reservations_core::error::ErrorPayload;
use park_reservations_core::types::BookingRequest;
use serde::Serialize;
use tokio::io::AsyncReadExt;

/// JSON envelope written to stdout for every command.
#[derive(Debug, Serialize)]
pub struct Response<T> {
    /// Whether the command succeeded
    pub ok: bool,
    /// Command result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Parse a booking request from JSON text.
///
/// # Errors
///
/// Returns [`AppError::Json`] if the text is not a booking request.
pub fn parse_request(raw: &str) -> Result<BookingRequest, AppError> {
    Ok(serde_json::from_str(raw)?)
}

/// Read a booking request from a file path, or from stdin when `source` is `-`.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the source cannot be read and [`AppError::Json`] if
/// its contents are not a booking request.
pub async fn read_request(source: &str) -> Result<BookingRequest, AppError> {
    let raw = if source == "-" {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        raw
    } else {
        tokio::fs::read_to_string(source).await?
    };
    parse_request(&raw)
}

/// Render a command outcome as a JSON envelope.
///
/// # Errors
///
/// Returns a serialization error only if `T` cannot be serialized.
pub fn render<T: Serialize>(result: &Result<T, AppError>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&envelope(result))
}

fn envelope<T>(result: &Result<T, AppError>) -> Response<&T> {
    match result {
        Ok(data) => Response {
            ok: true,
            data: Some(data),
            error: None,
        },
        Err(error) => Response {
            ok: false,
            data: None,
            error: Some(error.to_payload()),
        },
    }
}

/// Process exit code for a command outcome.
#[must_use]
pub const fn exit_code<T>(result: &Result<T, AppError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(error) => error.exit_code(),
    }
}
