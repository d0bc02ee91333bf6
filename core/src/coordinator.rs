//! Reservation coordinator - validator and capacity store in one pipeline.
//!
//! Every request walks the same state machine:
//!
//! ```text
//! Received ──► Validated ──► Reserving ──► Committed
//!     │                          │
//!     └──────────► Aborted ◄─────┘
//! ```
//!
//! A validation failure aborts before the store is touched. Once reserving, the store
//! either commits every registration or rolls back and reports why; the coordinator
//! surfaces that cause unchanged and never retries.

use crate::config::RuleConfig;
use crate::environment::Clock;
use crate::error::{RejectionReason, ReservationError, Result};
use crate::store::CapacityStore;
use crate::types::{BookingConfirmation, BookingRequest, SlotAvailability};
use crate::validator;
use std::sync::Arc;

/// Lifecycle phase of one booking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingPhase {
    /// Request accepted by the coordinator
    Received,
    /// Every business rule passed
    Validated,
    /// Store transaction in progress
    Reserving,
    /// Registrations persisted (terminal)
    Committed,
    /// Rejected or failed with nothing persisted (terminal)
    Aborted,
}

impl BookingPhase {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Whether `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Validated | Self::Aborted)
                | (Self::Validated, Self::Reserving)
                | (Self::Reserving, Self::Committed | Self::Aborted)
        )
    }
}

/// Result of one booking attempt together with the phases it went through.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    /// Phases in the order they were entered; always ends in a terminal phase
    pub phases: Vec<BookingPhase>,
    /// Confirmation or the cause of the abort
    pub result: Result<BookingConfirmation>,
}

impl BookingOutcome {
    /// The terminal phase.
    #[must_use]
    pub fn final_phase(&self) -> BookingPhase {
        self.phases.last().copied().unwrap_or(BookingPhase::Received)
    }
}

/// Orchestrates rule validation and atomic capacity reservation.
///
/// Cheap to clone; all collaborators are shared.
///
/// # Example
///
/// ```no_run
/// use park_reservations_core::config::RuleConfig;
/// use park_reservations_core::coordinator::ReservationCoordinator;
/// use park_reservations_core::environment::SystemClock;
/// use park_reservations_core::store::CapacityStore;
/// use park_reservations_core::types::{BookingRequest, ParticipantInput};
/// use std::sync::Arc;
///
/// async fn book(store: Arc<dyn CapacityStore>) {
///     let coordinator =
///         ReservationCoordinator::new(store, Arc::new(SystemClock), RuleConfig::default());
///     let request = BookingRequest::new(
///         "Safari",
///         "18-10-2025",
///         "16:00",
///         vec![ParticipantInput::new(100_000, "Juan Perez", 18)],
///     );
///     match coordinator.reserve(request).await {
///         Ok(confirmation) => println!("{} places left", confirmation.remaining_capacity),
///         Err(error) => println!("{}", error.code()),
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ReservationCoordinator {
    store: Arc<dyn CapacityStore>,
    clock: Arc<dyn Clock>,
    rules: Arc<RuleConfig>,
}

impl ReservationCoordinator {
    /// Creates a coordinator over a store, a clock and the rules in effect.
    #[must_use]
    pub fn new(store: Arc<dyn CapacityStore>, clock: Arc<dyn Clock>, rules: RuleConfig) -> Self {
        Self {
            store,
            clock,
            rules: Arc::new(rules),
        }
    }

    /// The rules in effect.
    #[must_use]
    pub fn rules(&self) -> &RuleConfig {
        &self.rules
    }

    /// Validate and reserve a booking.
    ///
    /// # Errors
    ///
    /// [`ReservationError::Rejected`] for any business rule or store conflict, and
    /// [`ReservationError::Temporary`] for infrastructure failures. In every error
    /// case nothing was persisted.
    #[tracing::instrument(
        skip(self, request),
        name = "reserve",
        fields(activity = %request.activity, date = %request.date, time = %request.time)
    )]
    pub async fn reserve(&self, request: BookingRequest) -> Result<BookingConfirmation> {
        self.reserve_with_trace(request).await.result
    }

    /// Like [`reserve`](Self::reserve) but also returns the phases visited.
    pub async fn reserve_with_trace(&self, request: BookingRequest) -> BookingOutcome {
        let mut phases = vec![BookingPhase::Received];
        tracing::debug!(
            participants = request.participants.len(),
            "Booking request received"
        );

        let now = self.clock.now();
        let booking = match validator::validate(&request, now, &self.rules) {
            Ok(booking) => booking,
            Err(rejection) => {
                advance(&mut phases, BookingPhase::Aborted);
                let error = ReservationError::from(rejection);
                record_abort(&error);
                return BookingOutcome {
                    phases,
                    result: Err(error),
                };
            }
        };
        advance(&mut phases, BookingPhase::Validated);
        tracing::debug!(slot = %booking.slot, "Booking validated");

        let participant_count = booking.participant_count();
        advance(&mut phases, BookingPhase::Reserving);
        tracing::debug!(slot = %booking.slot, participant_count, "Reserving capacity");

        let result = self.store.reserve(booking).await;
        match &result {
            Ok(confirmation) => {
                advance(&mut phases, BookingPhase::Committed);
                metrics::counter!("reservations.committed").increment(1);
                metrics::counter!("reservations.participants")
                    .increment(u64::from(confirmation.registrations_created));
                tracing::info!(
                    slot = %confirmation.slot,
                    slot_id = %confirmation.slot_id,
                    registrations = confirmation.registrations_created,
                    remaining_capacity = confirmation.remaining_capacity,
                    "Booking committed"
                );
            }
            Err(error) => {
                advance(&mut phases, BookingPhase::Aborted);
                record_abort(error);
            }
        }

        BookingOutcome { phases, result }
    }

    /// Remaining places for one slot.
    ///
    /// # Errors
    ///
    /// `INVALID_FORMAT` for malformed input, `NO_SUCH_SLOT` if the slot is not
    /// provisioned, or a temporary failure.
    pub async fn slot_availability(
        &self,
        activity: &str,
        date: &str,
        time: &str,
    ) -> Result<SlotAvailability> {
        let slot = validator::parse_slot(activity, date, time)?;
        self.store.slot_availability(slot).await
    }

    /// Remaining places for every slot of an activity on one day, by start time.
    ///
    /// # Errors
    ///
    /// `INVALID_FORMAT` for a malformed date or blank activity, or a temporary failure.
    pub async fn day_availability(
        &self,
        activity: &str,
        date: &str,
    ) -> Result<Vec<SlotAvailability>> {
        let activity = activity.trim();
        if activity.is_empty() {
            return Err(ReservationError::rejected(
                RejectionReason::InvalidFormat,
                "Activity name is required",
            ));
        }
        let date = validator::parse_date(date)?;
        self.store.day_availability(activity.to_string(), date).await
    }
}

impl std::fmt::Debug for ReservationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationCoordinator")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

fn advance(phases: &mut Vec<BookingPhase>, next: BookingPhase) {
    debug_assert!(
        phases.last().is_some_and(|current| current.can_transition_to(next)),
        "illegal booking phase transition to {next:?} after {phases:?}"
    );
    phases.push(next);
}

fn record_abort(error: &ReservationError) {
    match error {
        ReservationError::Rejected(rejection) => {
            metrics::counter!("reservations.rejected", "reason" => rejection.reason.code())
                .increment(1);
            tracing::info!(
                reason = %rejection.reason,
                message = %rejection.message,
                "Booking rejected"
            );
        }
        ReservationError::Temporary(message) => {
            metrics::counter!("reservations.failed").increment(1);
            tracing::warn!(error = %message, "Booking failed, nothing persisted");
        }
    }
}
