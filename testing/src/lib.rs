//! # Park Reservations Testing
//!
//! Testing utilities for the park reservation engine.
//!
//! This crate provides:
//! - [`FixedClock`] and [`test_clock`] for deterministic rule evaluation
//! - [`InMemoryCapacityStore`] with failure injection
//! - Request fixtures relative to the test clock
//! - proptest strategies for booking workloads
//!
//! ## Example
//!
//! ```no_run
//! use park_reservations_core::config::RuleConfig;
//! use park_reservations_core::coordinator::ReservationCoordinator;
//! use park_reservations_testing::{InMemoryCapacityStore, helpers, test_clock};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = InMemoryCapacityStore::new();
//! store.add_slot("Palestra", &helpers::days_from_today(1), "16:00", 5).await;
//!
//! let coordinator = ReservationCoordinator::new(
//!     Arc::new(store.clone()),
//!     Arc::new(test_clock()),
//!     RuleConfig::default(),
//! );
//! let request = helpers::palestra_request(&helpers::days_from_today(1), "16:00");
//! let confirmation = coordinator.reserve(request).await;
//! assert!(confirmation.is_ok());
//! # }
//! ```

use chrono::{DateTime, Utc};
use park_reservations_core::environment::Clock;

mod capacity_store;

pub use capacity_store::{DEFAULT_SIZE_CLASSES, InMemoryCapacityStore, SlotHold};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use park_reservations_testing::mocks::FixedClock;
    /// use park_reservations_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Fixed clock at an RFC 3339 instant.
        ///
        /// # Panics
        ///
        /// Panics if `instant` is not valid RFC 3339.
        #[must_use]
        #[allow(clippy::expect_used)]
        pub fn at(instant: &str) -> Self {
            Self::new(
                DateTime::parse_from_rfc3339(instant)
                    .expect("fixture timestamp should be RFC 3339")
                    .with_timezone(&Utc),
            )
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (Tuesday 2025-10-14 10:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::at(super::helpers::TEST_NOW)
    }
}

/// Request fixtures anchored on [`test_clock`].
pub mod helpers {
    use chrono::{DateTime, Days, Utc};
    use park_reservations_core::types::{BookingRequest, ParticipantInput};

    /// Instant returned by [`test_clock`](super::test_clock): a Tuesday morning.
    pub const TEST_NOW: &str = "2025-10-14T10:00:00Z";

    /// `DD-MM-YYYY` date `days` after the test clock's date.
    ///
    /// # Panics
    ///
    /// Panics if the date overflows, which never happens for test-sized offsets.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn days_from_today(days: u64) -> String {
        DateTime::parse_from_rfc3339(TEST_NOW)
            .expect("TEST_NOW is RFC 3339")
            .with_timezone(&Utc)
            .date_naive()
            .checked_add_days(Days::new(days))
            .expect("date in range")
            .format("%d-%m-%Y")
            .to_string()
    }

    /// The Perez family: three climbers aged 18, 20 and 15, all with sizes.
    #[must_use]
    pub fn perez_family() -> Vec<ParticipantInput> {
        vec![
            ParticipantInput::new(100_000, "Juan Perez", 18).with_size_class("M"),
            ParticipantInput::new(100_001, "Maria Perez", 20).with_size_class("S"),
            ParticipantInput::new(100_002, "Pepito Perez", 15).with_size_class("L"),
        ]
    }

    /// Palestra booking for the Perez family.
    #[must_use]
    pub fn palestra_request(date: &str, time: &str) -> BookingRequest {
        BookingRequest::new("Palestra", date, time, perez_family())
    }

    /// `count` sized adults with ids starting at `first_id`.
    #[must_use]
    pub fn group(first_id: i64, count: usize) -> Vec<ParticipantInput> {
        (first_id..)
            .take(count)
            .map(|id| ParticipantInput::new(id, format!("Visitor {id}"), 30).with_size_class("M"))
            .collect()
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Initial slot capacity between 0 and 20.
    pub fn capacity() -> impl Strategy<Value = u32> {
        0u32..=20
    }

    /// Sequence of 1 to 12 group sizes, each between 1 and 5.
    pub fn group_sizes() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1usize..=5, 1..=12)
    }

    /// Participant age between 0 and 90.
    pub fn age() -> impl Strategy<Value = u32> {
        0u32..=90
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn days_from_today_counts_from_test_clock() {
        assert_eq!(helpers::days_from_today(0), "14-10-2025");
        assert_eq!(helpers::days_from_today(1), "15-10-2025");
        assert_eq!(helpers::days_from_today(3), "17-10-2025");
    }
}
