//! Domain types for park activity reservations.
//!
//! Two families live here:
//!
//! - **Boundary types** ([`BookingRequest`], [`ParticipantInput`]) mirror what a form
//!   or HTTP layer collects. Every field a visitor can leave blank is optional so the
//!   validator, not the deserializer, decides how incomplete input is reported.
//! - **Validated types** ([`ValidatedBooking`], [`Participant`], [`SlotKey`]) are only
//!   produced by [`crate::validator::validate`] and are what capacity stores consume.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar date format used at the engine boundary (`DD-MM-YYYY`).
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Time-of-day format used at the engine boundary (`HH:MM`).
pub const TIME_FORMAT: &str = "%H:%M";

// ============================================================================
// Identifiers
// ============================================================================

/// National identity number of a participant.
///
/// Unique per slot: the same person cannot hold two registrations for one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(i64);

impl ParticipantId {
    /// Create a `ParticipantId` from its numeric value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage identifier of a provisioned activity slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(i64);

impl SlotId {
    /// Create a `SlotId` from its numeric value
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the numeric value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Slots
// ============================================================================

/// Identity of one bookable unit: activity, calendar date and start time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// Activity name as listed in the slot catalog (e.g. `"Palestra"`)
    pub activity: String,
    /// Calendar date of the slot
    #[serde(with = "boundary_date")]
    pub date: NaiveDate,
    /// Start time of the slot
    #[serde(with = "boundary_time")]
    pub time: NaiveTime,
}

impl SlotKey {
    /// Creates a new `SlotKey`
    #[must_use]
    pub fn new(activity: impl Into<String>, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            activity: activity.into(),
            date,
            time,
        }
    }

    /// The instant the slot starts, in park-local time.
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        NaiveDateTime::new(self.date, self.time)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.activity,
            self.date.format(DATE_FORMAT),
            self.time.format(TIME_FORMAT)
        )
    }
}

/// Remaining places in one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    /// The slot
    #[serde(flatten)]
    pub slot: SlotKey,
    /// Places still bookable
    pub remaining_capacity: u32,
}

// ============================================================================
// Booking input
// ============================================================================

/// One person as entered by the caller, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInput {
    /// National identity number
    #[serde(default)]
    pub id: Option<i64>,
    /// Full name
    #[serde(default)]
    pub name: Option<String>,
    /// Age in years
    #[serde(default)]
    pub age: Option<u32>,
    /// Protective-equipment size (e.g. `"M"`), if any
    #[serde(default)]
    pub size_class: Option<String>,
}

impl ParticipantInput {
    /// Creates a fully populated participant without a size class.
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, age: u32) -> Self {
        Self {
            id: Some(id),
            name: Some(name.into()),
            age: Some(age),
            size_class: None,
        }
    }

    /// Sets the size class.
    #[must_use]
    pub fn with_size_class(mut self, size_class: impl Into<String>) -> Self {
        self.size_class = Some(size_class.into());
        self
    }
}

/// A booking request as received from a form or HTTP layer.
///
/// Transient: it is consumed by the coordinator and never stored as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    /// Activity name
    pub activity: String,
    /// Date in `DD-MM-YYYY`
    pub date: String,
    /// Start time in `HH:MM`
    pub time: String,
    /// People to register
    #[serde(default)]
    pub participants: Vec<ParticipantInput>,
    /// Whether the visitor accepted the terms and conditions
    #[serde(default)]
    pub terms_accepted: bool,
}

impl BookingRequest {
    /// Creates a request with terms already accepted.
    #[must_use]
    pub fn new(
        activity: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
        participants: Vec<ParticipantInput>,
    ) -> Self {
        Self {
            activity: activity.into(),
            date: date.into(),
            time: time.into(),
            participants,
            terms_accepted: true,
        }
    }

    /// Overrides the terms flag.
    #[must_use]
    pub fn with_terms_accepted(mut self, accepted: bool) -> Self {
        self.terms_accepted = accepted;
        self
    }
}

// ============================================================================
// Validated booking
// ============================================================================

/// A participant that passed every rule check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// National identity number
    pub id: ParticipantId,
    /// Full name, trimmed
    pub name: String,
    /// Age in years
    pub age: u32,
    /// Size class name, trimmed; present whenever the activity requires one
    pub size_class: Option<String>,
}

/// A booking that passed the rule validator and is ready for the capacity store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedBooking {
    /// Target slot
    pub slot: SlotKey,
    /// Participants, in request order
    pub participants: Vec<Participant>,
    /// Whether each participant's size class must be resolved against the catalog
    pub requires_size_class: bool,
    /// Evaluation instant; recorded as the registration time
    pub requested_at: DateTime<Utc>,
}

impl ValidatedBooking {
    /// Number of places the booking consumes.
    #[must_use]
    pub fn participant_count(&self) -> u32 {
        u32::try_from(self.participants.len()).unwrap_or(u32::MAX)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// A committed link between one participant and one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// The slot
    pub slot: SlotKey,
    /// Registered person
    pub participant_id: ParticipantId,
    /// Registered person's name
    pub participant_name: String,
    /// Registered person's age
    pub participant_age: u32,
    /// Resolved size class name, if the activity required one
    pub size_class: Option<String>,
    /// When the registration was committed
    pub registered_at: DateTime<Utc>,
}

/// Success payload returned after a booking commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    /// Storage identifier of the slot
    pub slot_id: SlotId,
    /// Resolved slot identity
    pub slot: SlotKey,
    /// Number of registrations created
    pub registrations_created: u32,
    /// Registered participant identifiers, in request order
    pub participant_ids: Vec<ParticipantId>,
    /// Places left after this booking
    pub remaining_capacity: u32,
    /// Commit time
    pub confirmed_at: DateTime<Utc>,
}

// ============================================================================
// Serde helpers
// ============================================================================

mod boundary_date {
    use super::DATE_FORMAT;
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

mod boundary_time {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn slot_key_display_uses_boundary_formats() {
        let slot = SlotKey::new(
            "Palestra",
            NaiveDate::from_ymd_opt(2025, 10, 18).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        );
        assert_eq!(slot.to_string(), "Palestra 18-10-2025 16:00");
    }

    #[test]
    fn booking_request_reads_camel_case_json() {
        let request: BookingRequest = serde_json::from_str(
            r#"{
                "activity": "Palestra",
                "date": "18-10-2025",
                "time": "16:00",
                "participants": [
                    {"id": 100000, "name": "Juan Perez", "age": 18, "sizeClass": "M"},
                    {"id": 100001, "name": "Maria Perez", "age": 20, "sizeClass": null}
                ],
                "termsAccepted": true
            }"#,
        )
        .unwrap();

        assert!(request.terms_accepted);
        assert_eq!(request.participants.len(), 2);
        assert_eq!(request.participants[0].size_class.as_deref(), Some("M"));
        assert_eq!(request.participants[1].size_class, None);
    }

    #[test]
    fn missing_participant_fields_deserialize_as_none() {
        let input: ParticipantInput = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(input.id, Some(7));
        assert_eq!(input.name, None);
        assert_eq!(input.age, None);
    }

    #[test]
    fn availability_serializes_slot_inline() {
        let availability = SlotAvailability {
            slot: SlotKey::new(
                "Safari",
                NaiveDate::from_ymd_opt(2025, 10, 18).unwrap(),
                NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            ),
            remaining_capacity: 4,
        };

        let json = serde_json::to_value(&availability).unwrap();
        assert_eq!(json["activity"], "Safari");
        assert_eq!(json["date"], "18-10-2025");
        assert_eq!(json["time"], "09:30");
        assert_eq!(json["remainingCapacity"], 4);
    }
}
