//! # Park Reservations Core
//!
//! Booking engine for capacity-limited park activities.
//!
//! A booking request names an activity slot (activity, date, start time) and a list of
//! participants. The engine either registers every participant and decrements the
//! slot's remaining places as one atomic unit, or rejects the whole request with a
//! single reason and leaves storage untouched.
//!
//! ## Pipeline
//!
//! ```text
//! caller ─► ReservationCoordinator ─► validator::validate   (pure, no I/O)
//!                                  └─► CapacityStore::reserve (one transaction)
//! ```
//!
//! - [`validator`]: temporal and demographic rules, checked in a fixed order
//! - [`store`]: the [`CapacityStore`](store::CapacityStore) trait and shared outcome helpers
//! - [`coordinator`]: the request state machine, logging and metrics
//! - [`config`]: injected rule parameters ([`RuleConfig`](config::RuleConfig))
//! - [`environment`]: the [`Clock`](environment::Clock) abstraction
//!
//! Storage backends live in sibling crates: `park-reservations-postgres` for
//! production and `park-reservations-testing` for an in-memory store.

pub mod config;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod store;
pub mod types;
pub mod validator;

pub use config::{ActivityRule, BlackoutDate, ConfigError, Holiday, RuleConfig};
pub use coordinator::{BookingOutcome, BookingPhase, ReservationCoordinator};
pub use environment::{Clock, SystemClock};
pub use error::{ErrorCategory, ErrorPayload, Rejection, RejectionReason, ReservationError};
pub use store::{CapacityStore, StoreFuture};
pub use types::{
    BookingConfirmation, BookingRequest, Participant, ParticipantId, ParticipantInput,
    Registration, SlotAvailability, SlotId, SlotKey, ValidatedBooking,
};
