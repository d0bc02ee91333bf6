//! Rule validator - temporal and demographic eligibility checks.
//!
//! [`validate`] is a pure function: no I/O, deterministic given `now` and the
//! [`RuleConfig`]. Checks run in a fixed order and the first failure wins, so a
//! request that breaks several rules always reports the same reason:
//!
//! ```text
//!  1. terms accepted            → TermsNotAccepted
//!  2. date/time parse           → InvalidFormat
//!  3. blackout / closed weekday → BlackoutChristmas | BlackoutNewYear | BlackoutHoliday | ClosedWeekday
//!  4. slot not in the past      → AlreadyOccurred
//!  5. advance-booking window    → TooFarInAdvance
//!  6. opening hours and grid    → OutsideOperatingHours
//!  7. at least one participant  → NoParticipants
//!  8. then, one participant at a time, in request order:
//!     a. completeness           → IncompleteParticipant
//!     b. minimum age            → BelowMinimumAge
//!     c. size class present     → MissingSizeClass
//! ```
//!
//! A problem with an earlier participant is reported before any problem with a
//! later one.
//!
//! Size-class *validity* is not checked here; it needs a catalog lookup and belongs
//! to the capacity store.

use crate::config::{ActivityRule, Holiday, RuleConfig};
use crate::error::{Rejection, RejectionReason};
use crate::types::{
    BookingRequest, DATE_FORMAT, Participant, ParticipantId, ParticipantInput, SlotKey,
    TIME_FORMAT, ValidatedBooking,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

/// Validate a booking request against the rules in effect at `now`.
///
/// # Errors
///
/// Returns the first [`Rejection`] encountered, in the order documented at module level.
pub fn validate(
    request: &BookingRequest,
    now: DateTime<Utc>,
    rules: &RuleConfig,
) -> Result<ValidatedBooking, Rejection> {
    if !request.terms_accepted {
        return Err(Rejection::new(
            RejectionReason::TermsNotAccepted,
            "Terms and conditions must be accepted",
        ));
    }

    let slot = parse_slot(&request.activity, &request.date, &request.time)?;
    check_blackout(slot.date, rules)?;

    let local_now = rules.local_time(now);
    check_not_past(&slot, local_now)?;
    check_advance_window(&slot, local_now, rules)?;
    check_operating_hours(slot.time, rules)?;

    if request.participants.is_empty() {
        return Err(Rejection::new(
            RejectionReason::NoParticipants,
            "At least one participant is required",
        ));
    }

    let rule = rules.rule_for(&slot.activity);
    let participants = request
        .participants
        .iter()
        .enumerate()
        .map(|(index, input)| check_participant(index, input, &slot.activity, rule))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidatedBooking {
        slot,
        participants,
        requires_size_class: rule.requires_size_class,
        requested_at: now,
    })
}

/// Parse an activity name, `DD-MM-YYYY` date and `HH:MM` time into a [`SlotKey`].
///
/// # Errors
///
/// Returns [`RejectionReason::InvalidFormat`] if any part is blank or malformed.
pub fn parse_slot(activity: &str, date: &str, time: &str) -> Result<SlotKey, Rejection> {
    let activity = activity.trim();
    if activity.is_empty() {
        return Err(Rejection::new(
            RejectionReason::InvalidFormat,
            "Activity name is required",
        ));
    }
    Ok(SlotKey::new(activity, parse_date(date)?, parse_time(time)?))
}

/// Parse a `DD-MM-YYYY` date.
///
/// # Errors
///
/// Returns [`RejectionReason::InvalidFormat`] if the date is malformed.
pub fn parse_date(date: &str) -> Result<NaiveDate, Rejection> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT).map_err(|e| {
        Rejection::new(
            RejectionReason::InvalidFormat,
            format!("Date {date:?} is not in DD-MM-YYYY format: {e}"),
        )
    })
}

/// Parse an `HH:MM` time.
///
/// # Errors
///
/// Returns [`RejectionReason::InvalidFormat`] if the time is malformed.
pub fn parse_time(time: &str) -> Result<NaiveTime, Rejection> {
    NaiveTime::parse_from_str(time.trim(), TIME_FORMAT).map_err(|e| {
        Rejection::new(
            RejectionReason::InvalidFormat,
            format!("Time {time:?} is not in HH:MM format: {e}"),
        )
    })
}

fn check_blackout(date: NaiveDate, rules: &RuleConfig) -> Result<(), Rejection> {
    if let Some(blackout) = rules.blackout_for(date) {
        let (reason, message) = match blackout.holiday {
            Holiday::Christmas => (
                RejectionReason::BlackoutChristmas,
                "No bookings are accepted on Christmas Day".to_string(),
            ),
            Holiday::NewYear => (
                RejectionReason::BlackoutNewYear,
                "No bookings are accepted on New Year's Day".to_string(),
            ),
            Holiday::Other => (
                RejectionReason::BlackoutHoliday,
                format!("No bookings are accepted on {}", date.format(DATE_FORMAT)),
            ),
        };
        return Err(Rejection::new(reason, message));
    }

    if rules.is_closed_on(date.weekday()) {
        return Err(Rejection::new(
            RejectionReason::ClosedWeekday,
            format!("The park is closed on {:?}", date.weekday()),
        ));
    }

    Ok(())
}

fn check_not_past(slot: &SlotKey, local_now: NaiveDateTime) -> Result<(), Rejection> {
    if slot.starts_at() < local_now {
        return Err(Rejection::new(
            RejectionReason::AlreadyOccurred,
            format!("{slot} has already taken place"),
        ));
    }
    Ok(())
}

fn check_advance_window(
    slot: &SlotKey,
    local_now: NaiveDateTime,
    rules: &RuleConfig,
) -> Result<(), Rejection> {
    let days_ahead = (slot.date - local_now.date()).num_days();
    if days_ahead > i64::from(rules.advance_booking_days) {
        return Err(Rejection::new(
            RejectionReason::TooFarInAdvance,
            format!(
                "Bookings open at most {} days in advance; {slot} is {days_ahead} days away",
                rules.advance_booking_days
            ),
        ));
    }
    Ok(())
}

fn check_operating_hours(time: NaiveTime, rules: &RuleConfig) -> Result<(), Rejection> {
    if time < rules.opening_time || time > rules.last_start_time {
        return Err(Rejection::new(
            RejectionReason::OutsideOperatingHours,
            format!(
                "The park is closed at {}; slots start between {} and {}",
                time.format(TIME_FORMAT),
                rules.opening_time.format(TIME_FORMAT),
                rules.last_start_time.format(TIME_FORMAT)
            ),
        ));
    }

    let minutes_from_opening = (time - rules.opening_time).num_minutes();
    let on_grid = time.second() == 0
        && minutes_from_opening.checked_rem(i64::from(rules.slot_interval_minutes)) == Some(0);
    if !on_grid {
        return Err(Rejection::new(
            RejectionReason::OutsideOperatingHours,
            format!(
                "No slot starts at {}; slots run every {} minutes",
                time.format(TIME_FORMAT),
                rules.slot_interval_minutes
            ),
        ));
    }

    Ok(())
}

fn check_participant(
    index: usize,
    input: &ParticipantInput,
    activity: &str,
    rule: ActivityRule,
) -> Result<Participant, Rejection> {
    let participant = check_complete(index, input)?;

    if participant.age < rule.min_age {
        return Err(Rejection::new(
            RejectionReason::BelowMinimumAge,
            format!(
                "{} ({}) does not meet the minimum age of {} for {activity}",
                participant.name, participant.id, rule.min_age
            ),
        ));
    }

    if rule.requires_size_class && participant.size_class.is_none() {
        return Err(Rejection::new(
            RejectionReason::MissingSizeClass,
            format!(
                "A size class is required for {activity}; missing for {} ({})",
                participant.name, participant.id
            ),
        ));
    }

    Ok(participant)
}

fn check_complete(index: usize, input: &ParticipantInput) -> Result<Participant, Rejection> {
    let id = input.id.filter(|id| *id > 0);
    let name = input
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    match (id, name, input.age) {
        (Some(id), Some(name), Some(age)) => Ok(Participant {
            id: ParticipantId::new(id),
            name: name.to_string(),
            age,
            size_class: input
                .size_class
                .as_deref()
                .map(str::trim)
                .filter(|size| !size.is_empty())
                .map(str::to_string),
        }),
        _ => Err(Rejection::new(
            RejectionReason::IncompleteParticipant,
            format!(
                "Participant #{} needs an identifier, a name and an age",
                index + 1
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::BlackoutDate;

    /// Tuesday 14 October 2025, 10:00 UTC.
    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-10-14T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn climbers() -> Vec<ParticipantInput> {
        vec![
            ParticipantInput::new(100_000, "Juan Perez", 18).with_size_class("M"),
            ParticipantInput::new(100_001, "Maria Perez", 20).with_size_class("S"),
            ParticipantInput::new(100_002, "Pepito", 15).with_size_class("L"),
        ]
    }

    fn request(date: &str, time: &str) -> BookingRequest {
        BookingRequest::new("Palestra", date, time, climbers())
    }

    fn reason_of(request: &BookingRequest) -> RejectionReason {
        validate(request, now(), &RuleConfig::default())
            .unwrap_err()
            .reason
    }

    #[test]
    fn accepts_valid_climbing_booking() {
        let booking = validate(&request("15-10-2025", "16:00"), now(), &RuleConfig::default())
            .unwrap();

        assert_eq!(booking.slot.activity, "Palestra");
        assert_eq!(booking.slot.date, NaiveDate::from_ymd_opt(2025, 10, 15).unwrap());
        assert_eq!(booking.slot.time, NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert_eq!(booking.participant_count(), 3);
        assert!(booking.requires_size_class);
        assert_eq!(booking.requested_at, now());
    }

    #[test]
    fn activity_without_equipment_needs_no_size_class() {
        let request = BookingRequest::new(
            "Safari",
            "14-10-2025",
            "16:00",
            vec![
                ParticipantInput::new(100_000, "Juan Perez", 18),
                ParticipantInput::new(100_001, "Maria Perez", 20),
            ],
        );
        let booking = validate(&request, now(), &RuleConfig::default()).unwrap();
        assert!(!booking.requires_size_class);
    }

    #[test]
    fn terms_win_over_every_other_rule() {
        let request = BookingRequest::new("Palestra", "25-12-2025", "22:00", vec![])
            .with_terms_accepted(false);
        assert_eq!(reason_of(&request), RejectionReason::TermsNotAccepted);
    }

    #[test]
    fn malformed_date_and_time_are_invalid_format() {
        assert_eq!(reason_of(&request("2025-10-15", "16:00")), RejectionReason::InvalidFormat);
        assert_eq!(reason_of(&request("15-10-2025", "4pm")), RejectionReason::InvalidFormat);
        assert_eq!(reason_of(&request("31-02-2025", "16:00")), RejectionReason::InvalidFormat);

        let blank_activity = BookingRequest::new("  ", "15-10-2025", "16:00", climbers());
        assert_eq!(reason_of(&blank_activity), RejectionReason::InvalidFormat);
    }

    #[test]
    fn christmas_and_new_year_are_blacked_out() {
        assert_eq!(
            reason_of(&request("25-12-2025", "10:00")),
            RejectionReason::BlackoutChristmas
        );
        assert_eq!(
            reason_of(&request("01-01-2026", "10:00")),
            RejectionReason::BlackoutNewYear
        );
    }

    #[test]
    fn blackout_wins_over_past_and_window() {
        // Christmas 2024 is both in the past and a blackout date.
        assert_eq!(
            reason_of(&request("25-12-2024", "10:00")),
            RejectionReason::BlackoutChristmas
        );
    }

    #[test]
    fn configured_holiday_is_blacked_out() {
        let rules = RuleConfig::default().with_blackout_date(BlackoutDate::new(16, 10));
        let rejection = validate(&request("16-10-2025", "10:00"), now(), &rules).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::BlackoutHoliday);
    }

    #[test]
    fn monday_is_closed() {
        let sunday = DateTime::parse_from_rfc3339("2025-10-19T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let rejection =
            validate(&request("20-10-2025", "10:00"), sunday, &RuleConfig::default()).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::ClosedWeekday);
    }

    #[test]
    fn past_slot_already_occurred() {
        assert_eq!(
            reason_of(&request("11-10-2025", "10:30")),
            RejectionReason::AlreadyOccurred
        );
        // Same day, earlier hour.
        assert_eq!(
            reason_of(&request("14-10-2025", "09:30")),
            RejectionReason::AlreadyOccurred
        );
    }

    #[test]
    fn slot_starting_now_is_not_past() {
        assert!(validate(&request("14-10-2025", "10:00"), now(), &RuleConfig::default()).is_ok());
    }

    #[test]
    fn advance_window_is_inclusive() {
        assert!(validate(&request("16-10-2025", "16:00"), now(), &RuleConfig::default()).is_ok());
        assert_eq!(
            reason_of(&request("17-10-2025", "16:00")),
            RejectionReason::TooFarInAdvance
        );
    }

    #[test]
    fn advance_window_uses_park_local_date() {
        // 01:00 UTC on Wednesday is still Tuesday evening at UTC-3.
        let late_evening = DateTime::parse_from_rfc3339("2025-10-15T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let rules = RuleConfig::default().with_utc_offset_minutes(-180);

        let rejection = validate(&request("17-10-2025", "16:00"), late_evening, &rules).unwrap_err();
        assert_eq!(rejection.reason, RejectionReason::TooFarInAdvance);
        assert!(validate(&request("16-10-2025", "16:00"), late_evening, &rules).is_ok());
    }

    #[test]
    fn closed_hours_and_off_grid_times_are_rejected() {
        assert_eq!(
            reason_of(&request("15-10-2025", "22:00")),
            RejectionReason::OutsideOperatingHours
        );
        assert_eq!(
            reason_of(&request("15-10-2025", "08:30")),
            RejectionReason::OutsideOperatingHours
        );
        assert_eq!(
            reason_of(&request("15-10-2025", "18:30")),
            RejectionReason::OutsideOperatingHours
        );
        assert_eq!(
            reason_of(&request("15-10-2025", "10:25")),
            RejectionReason::OutsideOperatingHours
        );
        assert!(validate(&request("15-10-2025", "18:00"), now(), &RuleConfig::default()).is_ok());
        assert!(validate(&request("15-10-2025", "09:00"), now(), &RuleConfig::default()).is_ok());
    }

    #[test]
    fn empty_participant_list_is_rejected() {
        let request = BookingRequest::new("Palestra", "15-10-2025", "16:00", vec![]);
        assert_eq!(reason_of(&request), RejectionReason::NoParticipants);
    }

    #[test]
    fn incomplete_participants_are_rejected() {
        for incomplete in [
            ParticipantInput {
                id: None,
                ..ParticipantInput::new(1, "Ana", 30).with_size_class("M")
            },
            ParticipantInput {
                name: Some("   ".to_string()),
                ..ParticipantInput::new(1, "Ana", 30).with_size_class("M")
            },
            ParticipantInput {
                age: None,
                ..ParticipantInput::new(1, "Ana", 30).with_size_class("M")
            },
            ParticipantInput {
                id: Some(0),
                ..ParticipantInput::new(1, "Ana", 30).with_size_class("M")
            },
        ] {
            let mut participants = climbers();
            participants.push(incomplete);
            let request = BookingRequest::new("Palestra", "15-10-2025", "16:00", participants);
            assert_eq!(reason_of(&request), RejectionReason::IncompleteParticipant);
        }
    }

    #[test]
    fn earlier_participant_problem_wins() {
        let incomplete_second = BookingRequest::new(
            "Palestra",
            "15-10-2025",
            "16:00",
            vec![
                ParticipantInput::new(1, "Kid", 6).with_size_class("XS"),
                ParticipantInput {
                    name: None,
                    ..ParticipantInput::new(2, "Ana", 30)
                },
            ],
        );
        assert_eq!(reason_of(&incomplete_second), RejectionReason::BelowMinimumAge);

        let incomplete_first = BookingRequest::new(
            "Palestra",
            "15-10-2025",
            "16:00",
            vec![
                ParticipantInput {
                    age: None,
                    ..ParticipantInput::new(1, "Ana", 30)
                },
                ParticipantInput::new(2, "Kid", 6).with_size_class("XS"),
            ],
        );
        assert_eq!(reason_of(&incomplete_first), RejectionReason::IncompleteParticipant);
    }

    #[test]
    fn minimum_age_is_per_activity() {
        let mut participants = climbers();
        participants.push(ParticipantInput::new(100_003, "Pepito", 10).with_size_class("S"));
        let climbing = BookingRequest::new("Palestra", "15-10-2025", "16:00", participants);
        assert_eq!(reason_of(&climbing), RejectionReason::BelowMinimumAge);

        let zip_line = BookingRequest::new(
            "Tirolesa",
            "15-10-2025",
            "16:00",
            vec![
                ParticipantInput::new(100_000, "Juan Perez", 9).with_size_class("M"),
                ParticipantInput::new(100_003, "Carlitos", 7).with_size_class("XS"),
            ],
        );
        assert_eq!(reason_of(&zip_line), RejectionReason::BelowMinimumAge);
    }

    #[test]
    fn missing_size_of_first_participant_wins_over_age_of_second() {
        let request = BookingRequest::new(
            "Palestra",
            "15-10-2025",
            "16:00",
            vec![
                ParticipantInput::new(1, "Ana", 30),
                ParticipantInput::new(2, "Kid", 10).with_size_class("XS"),
            ],
        );
        assert_eq!(reason_of(&request), RejectionReason::MissingSizeClass);
    }

    #[test]
    fn age_is_checked_before_size_for_the_same_participant() {
        let request = BookingRequest::new(
            "Palestra",
            "15-10-2025",
            "16:00",
            vec![ParticipantInput::new(1, "Kid", 10)],
        );
        assert_eq!(reason_of(&request), RejectionReason::BelowMinimumAge);
    }

    #[test]
    fn unknown_activity_has_no_minimum_age() {
        let request = BookingRequest::new(
            "Kayak",
            "15-10-2025",
            "16:00",
            vec![ParticipantInput::new(1, "Toddler", 2)],
        );
        assert!(validate(&request, now(), &RuleConfig::default()).is_ok());
    }

    #[test]
    fn sized_activity_requires_non_blank_size_class() {
        let mut participants = climbers();
        participants[2].size_class = Some("  ".to_string());
        let request = BookingRequest::new("Palestra", "15-10-2025", "16:00", participants);
        assert_eq!(reason_of(&request), RejectionReason::MissingSizeClass);
    }

    #[test]
    fn injected_rules_replace_defaults() {
        let rules = RuleConfig::default()
            .with_activity("Palestra", ActivityRule::new(21))
            .with_advance_booking_days(7)
            .with_closed_weekdays(vec![]);

        let far_ahead = BookingRequest::new(
            "Palestra",
            "20-10-2025",
            "16:00",
            vec![ParticipantInput::new(1, "Ana", 30)],
        );
        assert!(validate(&far_ahead, now(), &rules).is_ok());

        let young = BookingRequest::new(
            "Palestra",
            "15-10-2025",
            "16:00",
            vec![ParticipantInput::new(1, "Juan", 18)],
        );
        assert_eq!(
            validate(&young, now(), &rules).unwrap_err().reason,
            RejectionReason::BelowMinimumAge
        );
    }

    #[test]
    fn participants_are_trimmed() {
        let request = BookingRequest::new(
            "Palestra",
            "15-10-2025",
            "16:00",
            vec![ParticipantInput::new(1, "  Ana Gomez ", 30).with_size_class(" M ")],
        );
        let booking = validate(&request, now(), &RuleConfig::default()).unwrap();
        assert_eq!(booking.participants[0].name, "Ana Gomez");
        assert_eq!(booking.participants[0].size_class.as_deref(), Some("M"));
    }
}
