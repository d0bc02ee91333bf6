//! Error types for reservation operations.
//!
//! Two tiers:
//!
//! - **Business rejections** ([`Rejection`]) carry a closed [`RejectionReason`] plus a
//!   human-readable message. They never leave partial state behind and the caller can
//!   fix the input and resubmit.
//! - **Infrastructure failures** ([`ReservationError::Temporary`]) mean the store was
//!   unreachable or the transaction could not complete. The engine never retries;
//!   that policy belongs to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for reservation operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Why a booking was refused.
///
/// Variants are listed in the order the validator checks them, followed by the
/// outcomes only the capacity store can decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    // ═══════════════════════════════════════════════════════════
    // Validator
    // ═══════════════════════════════════════════════════════════
    /// Terms and conditions were not accepted.
    TermsNotAccepted,
    /// Date, time or activity could not be parsed.
    InvalidFormat,
    /// The date is December 25th.
    BlackoutChristmas,
    /// The date is January 1st.
    BlackoutNewYear,
    /// The date is another configured holiday.
    BlackoutHoliday,
    /// The park is closed on that weekday.
    ClosedWeekday,
    /// The slot already started.
    AlreadyOccurred,
    /// The slot is beyond the advance-booking window.
    TooFarInAdvance,
    /// The start time is outside opening hours or off the slot grid.
    OutsideOperatingHours,
    /// The request lists nobody.
    NoParticipants,
    /// A participant is missing an identifier, name or age.
    IncompleteParticipant,
    /// A participant is younger than the activity minimum.
    BelowMinimumAge,
    /// A participant has no size class for an activity that needs one.
    MissingSizeClass,

    // ═══════════════════════════════════════════════════════════
    // Capacity store
    // ═══════════════════════════════════════════════════════════
    /// No slot is provisioned for that activity, date and time.
    NoSuchSlot,
    /// The slot has fewer places left than participants requested.
    InsufficientCapacity,
    /// A size class is not in the catalog.
    InvalidSizeClass,
    /// A participant is already registered for the slot.
    DuplicateParticipant,
}

impl RejectionReason {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TermsNotAccepted => "TERMS_NOT_ACCEPTED",
            Self::InvalidFormat => "INVALID_FORMAT",
            Self::BlackoutChristmas => "BLACKOUT_CHRISTMAS",
            Self::BlackoutNewYear => "BLACKOUT_NEW_YEAR",
            Self::BlackoutHoliday => "BLACKOUT_HOLIDAY",
            Self::ClosedWeekday => "CLOSED_WEEKDAY",
            Self::AlreadyOccurred => "ALREADY_OCCURRED",
            Self::TooFarInAdvance => "TOO_FAR_IN_ADVANCE",
            Self::OutsideOperatingHours => "OUTSIDE_OPERATING_HOURS",
            Self::NoParticipants => "NO_PARTICIPANTS",
            Self::IncompleteParticipant => "INCOMPLETE_PARTICIPANT",
            Self::BelowMinimumAge => "BELOW_MINIMUM_AGE",
            Self::MissingSizeClass => "MISSING_SIZE_CLASS",
            Self::NoSuchSlot => "NO_SUCH_SLOT",
            Self::InsufficientCapacity => "INSUFFICIENT_CAPACITY",
            Self::InvalidSizeClass => "INVALID_SIZE_CLASS",
            Self::DuplicateParticipant => "DUPLICATE_PARTICIPANT",
        }
    }

    /// Transport-independent category callers map to a status.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NoSuchSlot => ErrorCategory::NotFound,
            Self::InsufficientCapacity | Self::DuplicateParticipant => ErrorCategory::Conflict,
            _ => ErrorCategory::Validation,
        }
    }

    /// Whether only a capacity store can produce this reason.
    #[must_use]
    pub const fn is_store_outcome(&self) -> bool {
        matches!(
            self,
            Self::NoSuchSlot
                | Self::InsufficientCapacity
                | Self::InvalidSizeClass
                | Self::DuplicateParticipant
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Coarse error class for transport mapping (e.g. HTTP 400 / 409 / 404 / 503).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input broke a business rule.
    Validation,
    /// Input was valid but conflicts with current slot state.
    Conflict,
    /// The requested slot does not exist.
    NotFound,
    /// Infrastructure failure; the caller may retry later.
    Temporary,
}

impl ErrorCategory {
    /// Convert category to its wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Temporary => "temporary",
        }
    }
}

/// A business-rule rejection: reason plus message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct Rejection {
    /// Why the booking was refused
    pub reason: RejectionReason,
    /// Human-readable explanation
    pub message: String,
}

impl Rejection {
    /// Creates a new rejection.
    #[must_use]
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the reservation coordinator and capacity stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// The booking broke a business rule. Nothing was written.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Storage was unreachable or the transaction failed. Nothing was written.
    #[error("Temporary failure: {0}")]
    Temporary(String),
}

impl ReservationError {
    /// Shorthand for a rejection.
    #[must_use]
    pub fn rejected(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(reason, message))
    }

    /// The rejection reason, if this is a business outcome.
    #[must_use]
    pub const fn reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Rejected(rejection) => Some(rejection.reason),
            Self::Temporary(_) => None,
        }
    }

    /// Transport-independent category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Rejected(rejection) => rejection.reason.category(),
            Self::Temporary(_) => ErrorCategory::Temporary,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Rejected(rejection) => rejection.reason.code(),
            Self::Temporary(_) => "TEMPORARY_FAILURE",
        }
    }

    /// Human-readable message without the code prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Rejected(rejection) => &rejection.message,
            Self::Temporary(message) => message,
        }
    }

    /// Boundary payload for this error.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.message().to_string(),
            category: self.category(),
        }
    }
}

/// Failure payload handed to form or HTTP layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable code (e.g. `INSUFFICIENT_CAPACITY`)
    pub code: String,
    /// Human-readable explanation
    pub message: String,
    /// Category for status mapping
    pub category: ErrorCategory,
}
