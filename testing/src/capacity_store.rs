//! In-memory capacity store for fast, deterministic tests.
//!
//! Each slot has its own async mutex, so bookings for one slot queue behind each
//! other while bookings for different slots proceed independently. The slot map is
//! behind a separate mutex that is never held while waiting for a slot lock.
//!
//! `reserve` copies the locked slot, applies the capacity write and the inserts to
//! the copy, and only writes it back once every step succeeded. An abort simply drops
//! the copy.

use chrono::{NaiveDate, NaiveTime};
use park_reservations_core::error::ReservationError;
use park_reservations_core::store::{
    CapacityStore, StoreFuture, capacity_after, duplicate_participant, invalid_size_class,
    no_such_slot,
};
use park_reservations_core::types::{
    BookingConfirmation, Registration, SlotAvailability, SlotId, SlotKey, ValidatedBooking,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Size classes seeded into every new store.
pub const DEFAULT_SIZE_CLASSES: [&str; 5] = ["XS", "S", "M", "L", "XL"];

#[derive(Debug, Clone)]
struct SlotRecord {
    id: SlotId,
    remaining: u32,
    registrations: Vec<Registration>,
}

type SlotLock = Arc<Mutex<SlotRecord>>;

#[derive(Debug)]
struct Catalog {
    slots: BTreeMap<SlotKey, SlotLock>,
    size_classes: BTreeSet<String>,
    next_slot_id: i64,
}

/// A slot lock taken from outside, as a long-running booking would hold it.
///
/// Bookings for the slot wait until this is dropped.
#[derive(Debug)]
pub struct SlotHold {
    _guard: OwnedMutexGuard<SlotRecord>,
}

/// Per-slot locked [`CapacityStore`] with failure injection.
///
/// # Example
///
/// ```
/// use park_reservations_testing::InMemoryCapacityStore;
///
/// # async fn example() {
/// let store = InMemoryCapacityStore::new();
/// let slot = store.add_slot("Palestra", "15-10-2025", "16:00", 5).await;
/// assert_eq!(store.remaining_capacity(&slot).await, Some(5));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryCapacityStore {
    catalog: Arc<Mutex<Catalog>>,
    fail_next_write: Arc<AtomicBool>,
}

impl InMemoryCapacityStore {
    /// Create an empty store with the default size catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(Mutex::new(Catalog {
                slots: BTreeMap::new(),
                size_classes: DEFAULT_SIZE_CLASSES.iter().map(ToString::to_string).collect(),
                next_slot_id: 1,
            })),
            fail_next_write: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Provision a slot with `capacity` places and return its key.
    ///
    /// Re-provisioning an existing slot resets its capacity and keeps its registrations.
    ///
    /// # Panics
    ///
    /// Panics if `date` is not `DD-MM-YYYY` or `time` is not `HH:MM`.
    #[allow(clippy::expect_used)]
    pub async fn add_slot(&self, activity: &str, date: &str, time: &str, capacity: u32) -> SlotKey {
        let key = SlotKey::new(
            activity,
            NaiveDate::parse_from_str(date, "%d-%m-%Y").expect("fixture date is DD-MM-YYYY"),
            NaiveTime::parse_from_str(time, "%H:%M").expect("fixture time is HH:MM"),
        );
        self.provision(key.clone(), capacity).await;
        key
    }

    /// Provision a slot by key.
    pub async fn provision(&self, slot: SlotKey, capacity: u32) {
        let existing = {
            let mut catalog = self.catalog.lock().await;
            if let Some(lock) = catalog.slots.get(&slot) {
                Arc::clone(lock)
            } else {
                let id = SlotId::new(catalog.next_slot_id);
                catalog.next_slot_id += 1;
                catalog.slots.insert(
                    slot,
                    Arc::new(Mutex::new(SlotRecord {
                        id,
                        remaining: capacity,
                        registrations: Vec::new(),
                    })),
                );
                return;
            }
        };
        existing.lock().await.remaining = capacity;
    }

    /// Replace the size catalog.
    pub async fn set_size_classes(&self, names: &[&str]) {
        let mut catalog = self.catalog.lock().await;
        catalog.size_classes = names.iter().map(ToString::to_string).collect();
    }

    /// Make the next `reserve` fail with a temporary error after it has staged the
    /// capacity write but before any registration is inserted.
    pub fn fail_after_capacity_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Take a slot's lock and keep it until the returned hold is dropped.
    ///
    /// Returns `None` if the slot is not provisioned.
    pub async fn hold_slot(&self, slot: &SlotKey) -> Option<SlotHold> {
        let lock = self.slot_lock(slot).await?;
        Some(SlotHold {
            _guard: lock.lock_owned().await,
        })
    }

    /// Remaining places, or `None` if the slot is not provisioned.
    pub async fn remaining_capacity(&self, slot: &SlotKey) -> Option<u32> {
        let lock = self.slot_lock(slot).await?;
        let remaining = lock.lock().await.remaining;
        Some(remaining)
    }

    /// Number of registrations held against a slot (0 if not provisioned).
    pub async fn registration_count(&self, slot: &SlotKey) -> usize {
        match self.slot_lock(slot).await {
            Some(lock) => lock.lock().await.registrations.len(),
            None => 0,
        }
    }

    async fn slot_lock(&self, slot: &SlotKey) -> Option<SlotLock> {
        self.catalog.lock().await.slots.get(slot).map(Arc::clone)
    }
}

impl Default for InMemoryCapacityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CapacityStore for InMemoryCapacityStore {
    fn reserve(&self, booking: ValidatedBooking) -> StoreFuture<'_, BookingConfirmation> {
        Box::pin(async move {
            let (lock, size_classes) = {
                let catalog = self.catalog.lock().await;
                let Some(lock) = catalog.slots.get(&booking.slot) else {
                    return Err(no_such_slot(&booking.slot).into());
                };
                (Arc::clone(lock), catalog.size_classes.clone())
            };

            let mut record = lock.lock().await;
            let mut staged = record.clone();

            staged.remaining =
                capacity_after(&booking.slot, staged.remaining, booking.participant_count())?;

            // Let other callers queue on the slot lock while this one holds it.
            tokio::task::yield_now().await;

            if self.fail_next_write.swap(false, Ordering::SeqCst) {
                return Err(ReservationError::Temporary(
                    "injected failure after capacity write".to_string(),
                ));
            }

            for participant in &booking.participants {
                let size_class = if booking.requires_size_class {
                    match participant.size_class.as_deref() {
                        Some(name) if size_classes.contains(name) => Some(name.to_string()),
                        Some(name) => return Err(invalid_size_class(name, participant.id).into()),
                        None => return Err(invalid_size_class("", participant.id).into()),
                    }
                } else {
                    None
                };

                if staged
                    .registrations
                    .iter()
                    .any(|registration| registration.participant_id == participant.id)
                {
                    return Err(duplicate_participant(&booking.slot, participant.id).into());
                }

                staged.registrations.push(Registration {
                    slot: booking.slot.clone(),
                    participant_id: participant.id,
                    participant_name: participant.name.clone(),
                    participant_age: participant.age,
                    size_class,
                    registered_at: booking.requested_at,
                });
            }

            let confirmation = BookingConfirmation {
                slot_id: staged.id,
                slot: booking.slot.clone(),
                registrations_created: booking.participant_count(),
                participant_ids: booking.participants.iter().map(|p| p.id).collect(),
                remaining_capacity: staged.remaining,
                confirmed_at: booking.requested_at,
            };
            *record = staged;
            Ok(confirmation)
        })
    }

    fn slot_availability(&self, slot: SlotKey) -> StoreFuture<'_, SlotAvailability> {
        Box::pin(async move {
            let lock = self
                .slot_lock(&slot)
                .await
                .ok_or_else(|| no_such_slot(&slot))?;
            let remaining_capacity = lock.lock().await.remaining;
            Ok(SlotAvailability {
                slot,
                remaining_capacity,
            })
        })
    }

    fn day_availability(
        &self,
        activity: String,
        date: NaiveDate,
    ) -> StoreFuture<'_, Vec<SlotAvailability>> {
        Box::pin(async move {
            // BTreeMap order is (activity, date, time), so the matches are already by time.
            let matching: Vec<(SlotKey, SlotLock)> = self
                .catalog
                .lock()
                .await
                .slots
                .iter()
                .filter(|(key, _)| key.activity == activity && key.date == date)
                .map(|(key, lock)| (key.clone(), Arc::clone(lock)))
                .collect();

            let mut day = Vec::with_capacity(matching.len());
            for (slot, lock) in matching {
                let remaining_capacity = lock.lock().await.remaining;
                day.push(SlotAvailability {
                    slot,
                    remaining_capacity,
                });
            }
            Ok(day)
        })
    }

    fn registrations(&self, slot: SlotKey) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(async move {
            let lock = self
                .slot_lock(&slot)
                .await
                .ok_or_else(|| no_such_slot(&slot))?;
            let registrations = lock.lock().await.registrations.clone();
            Ok(registrations)
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::{DateTime, Utc};
    use park_reservations_core::error::RejectionReason;
    use park_reservations_core::types::{Participant, ParticipantId};
    use std::time::Duration;

    fn participant(id: i64, size: Option<&str>) -> Participant {
        Participant {
            id: ParticipantId::new(id),
            name: format!("Participant {id}"),
            age: 30,
            size_class: size.map(ToString::to_string),
        }
    }

    fn booking(slot: &SlotKey, participants: Vec<Participant>) -> ValidatedBooking {
        ValidatedBooking {
            slot: slot.clone(),
            participants,
            requires_size_class: true,
            requested_at: DateTime::parse_from_rfc3339("2025-10-14T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[tokio::test]
    async fn reserve_decrements_and_records() {
        let store = InMemoryCapacityStore::new();
        let slot = store.add_slot("Palestra", "15-10-2025", "16:00", 5).await;

        let confirmation = store
            .reserve(booking(&slot, vec![participant(1, Some("M")), participant(2, Some("S"))]))
            .await
            .unwrap();

        assert_eq!(confirmation.remaining_capacity, 3);
        assert_eq!(confirmation.registrations_created, 2);
        assert_eq!(store.remaining_capacity(&slot).await, Some(3));
        assert_eq!(store.registration_count(&slot).await, 2);
    }

    #[tokio::test]
    async fn unknown_size_class_aborts_whole_batch() {
        let store = InMemoryCapacityStore::new();
        let slot = store.add_slot("Palestra", "15-10-2025", "16:00", 5).await;

        let error = store
            .reserve(booking(&slot, vec![participant(1, Some("M")), participant(2, Some("XXL"))]))
            .await
            .unwrap_err();

        assert_eq!(error.reason(), Some(RejectionReason::InvalidSizeClass));
        assert_eq!(store.remaining_capacity(&slot).await, Some(5));
        assert_eq!(store.registration_count(&slot).await, 0);
    }

    #[tokio::test]
    async fn injected_failure_leaves_no_trace() {
        let store = InMemoryCapacityStore::new();
        let slot = store.add_slot("Palestra", "15-10-2025", "16:00", 5).await;
        store.fail_after_capacity_write();

        let error = store
            .reserve(booking(&slot, vec![participant(1, Some("M"))]))
            .await
            .unwrap_err();
        assert!(matches!(error, ReservationError::Temporary(_)));
        assert_eq!(store.remaining_capacity(&slot).await, Some(5));

        // One-shot: the next attempt goes through.
        assert!(store.reserve(booking(&slot, vec![participant(1, Some("M"))])).await.is_ok());
    }

    #[tokio::test]
    async fn reprovisioning_keeps_slot_id() {
        let store = InMemoryCapacityStore::new();
        let first = store.add_slot("Safari", "15-10-2025", "10:00", 5).await;
        let second = store.add_slot("Safari", "15-10-2025", "10:30", 5).await;
        store.provision(first.clone(), 8).await;

        let a = store.slot_availability(first.clone()).await.unwrap();
        assert_eq!(a.remaining_capacity, 8);

        let mut no_equipment = booking(&second, vec![participant(1, None)]);
        no_equipment.requires_size_class = false;
        let confirmation = store.reserve(no_equipment).await.unwrap();
        assert_eq!(confirmation.slot_id, SlotId::new(2));
    }

    #[tokio::test]
    async fn held_slot_does_not_block_other_slots() {
        let store = InMemoryCapacityStore::new();
        let busy = store.add_slot("Palestra", "15-10-2025", "16:00", 5).await;
        let free = store.add_slot("Palestra", "15-10-2025", "16:30", 5).await;
        let hold = store.hold_slot(&busy).await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            store.reserve(booking(&free, vec![participant(1, Some("M"))])),
        )
        .await;
        assert!(matches!(other, Ok(Ok(_))));

        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            store.reserve(booking(&busy, vec![participant(1, Some("M"))])),
        )
        .await;
        assert!(waiting.is_err());

        drop(hold);
        store
            .reserve(booking(&busy, vec![participant(1, Some("M"))]))
            .await
            .unwrap();
        assert_eq!(store.remaining_capacity(&busy).await, Some(4));
    }
}
