//! `PostgreSQL` capacity store for park reservations.
//!
//! Implements [`CapacityStore`] on top of sqlx. Each booking runs in one transaction:
//!
//! 1. `SELECT ... FOR UPDATE` on the `activity_slots` row
//! 2. capacity check and `UPDATE` of `remaining_capacity`
//! 3. size-class lookup and `INSERT` into `registrations` per participant
//! 4. `COMMIT`, or `ROLLBACK` on the first failure
//!
//! The row lock serializes bookings for one slot; bookings for different slots never
//! contend. The wait for that lock is capped by a transaction-local `lock_timeout`
//! ([`DEFAULT_LOCK_TIMEOUT`] unless set with
//! [`with_lock_timeout`](PostgresCapacityStore::with_lock_timeout)); expiry is a
//! temporary failure. The `UNIQUE (slot_id, participant_id)` constraint rejects duplicates,
//! including a participant listed twice in the same booking.
//!
//! # Example
//!
//! ```no_run
//! use park_reservations_postgres::PostgresCapacityStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresCapacityStore::new("postgres://localhost/park").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use park_reservations_core::error::{ReservationError, Result};
use park_reservations_core::store::{
    CapacityStore, StoreFuture, capacity_after, duplicate_participant, invalid_size_class,
    no_such_slot,
};
use park_reservations_core::types::{
    BookingConfirmation, Participant, ParticipantId, Registration, SlotAvailability, SlotId,
    SlotKey, ValidatedBooking,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;

const LOCK_SLOT: &str = r"
    SELECT s.id, s.remaining_capacity
    FROM activity_slots s
    JOIN activities a ON a.id = s.activity_id
    JOIN time_slots t ON t.id = s.time_slot_id
    WHERE a.name = $1 AND s.slot_date = $2 AND t.start_time = $3
    FOR UPDATE OF s
";

const FIND_SLOT: &str = r"
    SELECT s.id, s.remaining_capacity
    FROM activity_slots s
    JOIN activities a ON a.id = s.activity_id
    JOIN time_slots t ON t.id = s.time_slot_id
    WHERE a.name = $1 AND s.slot_date = $2 AND t.start_time = $3
";

#[derive(Debug, sqlx::FromRow)]
struct SlotRow {
    id: i64,
    remaining_capacity: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct DaySlotRow {
    start_time: NaiveTime,
    remaining_capacity: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct RegistrationRow {
    participant_id: i64,
    participant_name: String,
    participant_age: i32,
    size_class: Option<String>,
    registered_at: DateTime<Utc>,
}

/// How long a booking waits for another booking's lock on the same slot by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// `PostgreSQL`-backed [`CapacityStore`].
#[derive(Clone, Debug)]
pub struct PostgresCapacityStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresCapacityStore {
    /// Connect with a default pool of 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Temporary`] if the database is unreachable.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| database_error("Failed to connect", &e))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Bound the wait for a slot lock held by a concurrent booking.
    ///
    /// A booking that cannot lock its slot in time fails with
    /// [`ReservationError::Temporary`] and writes nothing.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the reservation tables and seed the size catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Temporary`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ReservationError::Temporary(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Create or reset a slot with `capacity` places.
    ///
    /// Slots are normally provisioned by park administration; this is the hook for
    /// that tooling and for test fixtures. Existing registrations are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Temporary`] on database failure or a capacity that
    /// does not fit the column.
    pub async fn provision_slot(&self, slot: &SlotKey, capacity: u32) -> Result<SlotId> {
        let capacity = to_db_count(capacity)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to start transaction", &e))?;

        let result = provision_in(&mut tx, slot, capacity).await;
        finish(tx, result).await
    }

    async fn reserve_booking(&self, booking: ValidatedBooking) -> Result<BookingConfirmation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to start transaction", &e))?;

        let result = match set_lock_timeout(&mut tx, self.lock_timeout).await {
            Ok(()) => reserve_in(&mut tx, &booking).await,
            Err(error) => Err(error),
        };
        if let Err(ReservationError::Rejected(rejection)) = &result {
            metrics::counter!("reservations.store.rollbacks", "reason" => rejection.reason.code())
                .increment(1);
        }
        finish(tx, result).await
    }

    async fn find_slot(&self, slot: &SlotKey) -> Result<SlotRow> {
        sqlx::query_as::<_, SlotRow>(FIND_SLOT)
            .bind(&slot.activity)
            .bind(slot.date)
            .bind(slot.time)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error("Failed to load slot", &e))?
            .ok_or_else(|| no_such_slot(slot).into())
    }

    async fn load_availability(&self, slot: SlotKey) -> Result<SlotAvailability> {
        let row = self.find_slot(&slot).await?;
        Ok(SlotAvailability {
            remaining_capacity: from_db_count(row.remaining_capacity)?,
            slot,
        })
    }

    async fn load_day(&self, activity: String, date: NaiveDate) -> Result<Vec<SlotAvailability>> {
        let rows = sqlx::query_as::<_, DaySlotRow>(
            r"
            SELECT t.start_time, s.remaining_capacity
            FROM activity_slots s
            JOIN activities a ON a.id = s.activity_id
            JOIN time_slots t ON t.id = s.time_slot_id
            WHERE a.name = $1 AND s.slot_date = $2
            ORDER BY t.start_time
            ",
        )
        .bind(&activity)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("Failed to load day availability", &e))?;

        rows.into_iter()
            .map(|row| {
                Ok(SlotAvailability {
                    slot: SlotKey::new(activity.clone(), date, row.start_time),
                    remaining_capacity: from_db_count(row.remaining_capacity)?,
                })
            })
            .collect()
    }

    async fn load_registrations(&self, slot: SlotKey) -> Result<Vec<Registration>> {
        let slot_row = self.find_slot(&slot).await?;
        let rows = sqlx::query_as::<_, RegistrationRow>(
            r"
            SELECT r.participant_id, r.participant_name, r.participant_age,
                   z.name AS size_class, r.registered_at
            FROM registrations r
            LEFT JOIN size_classes z ON z.id = r.size_class_id
            WHERE r.slot_id = $1
            ORDER BY r.id
            ",
        )
        .bind(slot_row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("Failed to load registrations", &e))?;

        rows.into_iter()
            .map(|row| {
                Ok(Registration {
                    slot: slot.clone(),
                    participant_id: ParticipantId::new(row.participant_id),
                    participant_name: row.participant_name,
                    participant_age: from_db_count(row.participant_age)?,
                    size_class: row.size_class,
                    registered_at: row.registered_at,
                })
            })
            .collect()
    }
}

impl CapacityStore for PostgresCapacityStore {
    fn reserve(&self, booking: ValidatedBooking) -> StoreFuture<'_, BookingConfirmation> {
        Box::pin(self.reserve_booking(booking))
    }

    fn slot_availability(&self, slot: SlotKey) -> StoreFuture<'_, SlotAvailability> {
        Box::pin(self.load_availability(slot))
    }

    fn day_availability(
        &self,
        activity: String,
        date: NaiveDate,
    ) -> StoreFuture<'_, Vec<SlotAvailability>> {
        Box::pin(self.load_day(activity, date))
    }

    fn registrations(&self, slot: SlotKey) -> StoreFuture<'_, Vec<Registration>> {
        Box::pin(self.load_registrations(slot))
    }
}

// ============================================================================
// Transaction bodies
// ============================================================================

async fn reserve_in(
    tx: &mut Transaction<'static, Postgres>,
    booking: &ValidatedBooking,
) -> Result<BookingConfirmation> {
    let slot = &booking.slot;
    let locked = sqlx::query_as::<_, SlotRow>(LOCK_SLOT)
        .bind(&slot.activity)
        .bind(slot.date)
        .bind(slot.time)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            if is_lock_timeout(&e) {
                metrics::counter!("reservations.store.lock_timeouts").increment(1);
                return ReservationError::Temporary(format!(
                    "Timed out waiting for the lock on {slot}"
                ));
            }
            database_error("Failed to lock slot", &e)
        })?
        .ok_or_else(|| no_such_slot(slot))?;

    let remaining = from_db_count(locked.remaining_capacity)?;
    let requested = booking.participant_count();
    let remaining_after = capacity_after(slot, remaining, requested)?;
    tracing::debug!(slot_id = locked.id, remaining, requested, "Slot locked");

    sqlx::query("UPDATE activity_slots SET remaining_capacity = $2 WHERE id = $1")
        .bind(locked.id)
        .bind(to_db_count(remaining_after)?)
        .execute(&mut **tx)
        .await
        .map_err(|e| database_error("Failed to update capacity", &e))?;

    for participant in &booking.participants {
        let size_class_id = if booking.requires_size_class {
            Some(resolve_size_class(tx, participant).await?)
        } else {
            None
        };
        insert_registration(tx, booking, locked.id, participant, size_class_id).await?;
    }

    Ok(BookingConfirmation {
        slot_id: SlotId::new(locked.id),
        slot: slot.clone(),
        registrations_created: requested,
        participant_ids: booking.participants.iter().map(|p| p.id).collect(),
        remaining_capacity: remaining_after,
        confirmed_at: booking.requested_at,
    })
}

/// Scope `lock_timeout` to the current transaction.
async fn set_lock_timeout(
    tx: &mut Transaction<'static, Postgres>,
    lock_timeout: Duration,
) -> Result<()> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout.as_millis()))
        .execute(&mut **tx)
        .await
        .map_err(|e| database_error("Failed to set lock timeout", &e))?;
    Ok(())
}

async fn resolve_size_class(
    tx: &mut Transaction<'static, Postgres>,
    participant: &Participant,
) -> Result<i64> {
    let name = participant.size_class.as_deref().unwrap_or_default();
    let id: Option<(i64,)> = sqlx::query_as("SELECT id FROM size_classes WHERE name = $1")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| database_error("Failed to resolve size class", &e))?;

    id.map(|(id,)| id)
        .ok_or_else(|| invalid_size_class(name, participant.id).into())
}

async fn insert_registration(
    tx: &mut Transaction<'static, Postgres>,
    booking: &ValidatedBooking,
    slot_id: i64,
    participant: &Participant,
    size_class_id: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO registrations
            (slot_id, participant_id, participant_name, participant_age, size_class_id, registered_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(slot_id)
    .bind(participant.id.as_i64())
    .bind(&participant.name)
    .bind(to_db_count(participant.age)?)
    .bind(size_class_id)
    .bind(booking.requested_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return duplicate_participant(&booking.slot, participant.id).into();
            }
        }
        database_error("Failed to insert registration", &e)
    })?;

    Ok(())
}

async fn provision_in(
    tx: &mut Transaction<'static, Postgres>,
    slot: &SlotKey,
    capacity: i32,
) -> Result<SlotId> {
    let (activity_id,): (i64,) = sqlx::query_as(
        r"
        INSERT INTO activities (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        ",
    )
    .bind(&slot.activity)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| database_error("Failed to upsert activity", &e))?;

    let (time_slot_id,): (i64,) = sqlx::query_as(
        r"
        INSERT INTO time_slots (start_time) VALUES ($1)
        ON CONFLICT (start_time) DO UPDATE SET start_time = EXCLUDED.start_time
        RETURNING id
        ",
    )
    .bind(slot.time)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| database_error("Failed to upsert time slot", &e))?;

    let (slot_id,): (i64,) = sqlx::query_as(
        r"
        INSERT INTO activity_slots (activity_id, time_slot_id, slot_date, remaining_capacity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (activity_id, time_slot_id, slot_date)
            DO UPDATE SET remaining_capacity = EXCLUDED.remaining_capacity
        RETURNING id
        ",
    )
    .bind(activity_id)
    .bind(time_slot_id)
    .bind(slot.date)
    .bind(capacity)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| database_error("Failed to upsert activity slot", &e))?;

    tracing::info!(slot = %slot, slot_id, capacity, "Slot provisioned");
    Ok(SlotId::new(slot_id))
}

/// `lock_not_available` (SQLSTATE 55P03), raised when `lock_timeout` expires.
fn is_lock_timeout(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "55P03")
}

/// Commit on success, roll back on any error.
async fn finish<T>(tx: Transaction<'static, Postgres>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| database_error("Failed to commit transaction", &e))?;
            Ok(value)
        }
        Err(error) => {
            let _ = tx.rollback().await; // Ignore rollback errors
            Err(error)
        }
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn database_error(context: &str, error: &sqlx::Error) -> ReservationError {
    tracing::warn!(error = %error, "{context}");
    ReservationError::Temporary(format!("{context}: {error}"))
}

fn from_db_count(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ReservationError::Temporary(format!("Negative count in database: {value}")))
}

fn to_db_count(value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ReservationError::Temporary(format!("Count {value} exceeds column range")))
}
