//! Capacity store trait - atomic slot accounting.
//!
//! A capacity store owns the remaining-places counter of every provisioned slot and
//! the registrations held against it. [`CapacityStore::reserve`] is the only write
//! path: it decrements the counter and records every participant in one atomic unit,
//! or changes nothing at all.
//!
//! # Implementations
//!
//! - `PostgresCapacityStore` (in `park-reservations-postgres`): row-locked transactions
//! - `InMemoryCapacityStore` (in `park-reservations-testing`): one async mutex per slot, for tests
//!
//! # Concurrency
//!
//! Concurrent `reserve` calls against the same slot must serialize on that slot.
//! Two bookings whose combined headcount exceeds the remaining places can never both
//! commit. Bookings against different slots must not block each other.

use crate::error::{Rejection, RejectionReason, ReservationError};
use crate::types::{
    BookingConfirmation, ParticipantId, Registration, SlotAvailability, SlotKey,
    ValidatedBooking,
};
use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`CapacityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ReservationError>> + Send + 'a>>;

/// Storage abstraction for slot capacity and registrations.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] instead of using `async fn` so the coordinator can
/// hold an `Arc<dyn CapacityStore>`.
pub trait CapacityStore: Send + Sync {
    /// Atomically reserve one place per participant and record their registrations.
    ///
    /// Within one transaction, in order:
    ///
    /// 1. Look up the slot by `(activity, date, time)` and lock it.
    /// 2. Verify `remaining_capacity >= participants.len()`.
    /// 3. Decrement the counter by the participant count.
    /// 4. For each participant, resolve the size class (when required) and insert a
    ///    registration.
    /// 5. Commit.
    ///
    /// # Errors
    ///
    /// - `NO_SUCH_SLOT`: no slot is provisioned for the key
    /// - `INSUFFICIENT_CAPACITY`: fewer places left than participants
    /// - `INVALID_SIZE_CLASS`: a size class is not in the catalog
    /// - `DUPLICATE_PARTICIPANT`: a participant already holds a place in the slot,
    ///   including twice within the same booking
    /// - [`ReservationError::Temporary`]: storage failure
    ///
    /// Every error leaves capacity and registrations exactly as they were.
    fn reserve(&self, booking: ValidatedBooking) -> StoreFuture<'_, BookingConfirmation>;

    /// Remaining places for one slot.
    ///
    /// # Errors
    ///
    /// `NO_SUCH_SLOT` if the slot is not provisioned, or a temporary failure.
    fn slot_availability(&self, slot: SlotKey) -> StoreFuture<'_, SlotAvailability>;

    /// Remaining places for every provisioned slot of an activity on one day,
    /// ordered by start time. Empty if nothing is provisioned.
    ///
    /// # Errors
    ///
    /// Temporary failure only.
    fn day_availability(
        &self,
        activity: String,
        date: NaiveDate,
    ) -> StoreFuture<'_, Vec<SlotAvailability>>;

    /// Registrations held against one slot, in insertion order.
    ///
    /// # Errors
    ///
    /// `NO_SUCH_SLOT` if the slot is not provisioned, or a temporary failure.
    fn registrations(&self, slot: SlotKey) -> StoreFuture<'_, Vec<Registration>>;
}

// ============================================================================
// Shared outcome helpers
// ============================================================================

/// Capacity left after taking `requested` places, or `INSUFFICIENT_CAPACITY`.
///
/// # Errors
///
/// Returns [`RejectionReason::InsufficientCapacity`] if `requested > remaining`.
pub fn capacity_after(slot: &SlotKey, remaining: u32, requested: u32) -> Result<u32, Rejection> {
    remaining.checked_sub(requested).ok_or_else(|| {
        Rejection::new(
            RejectionReason::InsufficientCapacity,
            format!("Only {remaining} places left for {slot}; {requested} requested"),
        )
    })
}

/// `NO_SUCH_SLOT` for `slot`.
#[must_use]
pub fn no_such_slot(slot: &SlotKey) -> Rejection {
    Rejection::new(
        RejectionReason::NoSuchSlot,
        format!("No slot is scheduled for {slot}"),
    )
}

/// `INVALID_SIZE_CLASS` for a participant's size.
#[must_use]
pub fn invalid_size_class(size_class: &str, participant: ParticipantId) -> Rejection {
    Rejection::new(
        RejectionReason::InvalidSizeClass,
        format!("Size class {size_class:?} of participant {participant} is not in the catalog"),
    )
}

/// `DUPLICATE_PARTICIPANT` for a participant already registered in `slot`.
#[must_use]
pub fn duplicate_participant(slot: &SlotKey, participant: ParticipantId) -> Rejection {
    Rejection::new(
        RejectionReason::DuplicateParticipant,
        format!("Participant {participant} is already registered for {slot}"),
    )
}
