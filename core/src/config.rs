//! Business-rule configuration for the reservation engine.
//!
//! Minimum ages, sized-equipment activities, opening hours, blackout dates and the
//! advance-booking window are injected rather than hard-coded, so rule changes never
//! touch the validator's control flow.
//!
//! # Environment variables
//!
//! | Variable | Default | Format |
//! |----------|---------|--------|
//! | `PARK_ACTIVITY_RULES` | `Palestra=12:sized,Tirolesa=8:sized,Safari=0,Jardinería=0` | `name=min_age[:sized]`, comma-separated |
//! | `PARK_OPENING_TIME` | `09:00` | `HH:MM` |
//! | `PARK_LAST_START_TIME` | `18:00` | `HH:MM` |
//! | `PARK_SLOT_INTERVAL_MINUTES` | `30` | minutes |
//! | `PARK_BLACKOUT_DATES` | `25-12,01-01` | `DD-MM`, comma-separated |
//! | `PARK_CLOSED_WEEKDAYS` | `mon` | weekday names, comma-separated |
//! | `PARK_ADVANCE_BOOKING_DAYS` | `2` | days |
//! | `PARK_UTC_OFFSET_MINUTES` | `0` | minutes east of UTC |

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was present but could not be parsed.
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
        /// What was wrong with it
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Per-activity eligibility rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRule {
    /// Minimum participant age in years
    pub min_age: u32,
    /// Whether each participant needs sized protective equipment
    pub requires_size_class: bool,
}

impl ActivityRule {
    /// Rule with a minimum age and no equipment.
    #[must_use]
    pub const fn new(min_age: u32) -> Self {
        Self {
            min_age,
            requires_size_class: false,
        }
    }

    /// Rule with a minimum age and sized equipment.
    #[must_use]
    pub const fn sized(min_age: u32) -> Self {
        Self {
            min_age,
            requires_size_class: true,
        }
    }
}

/// Which holiday a blackout date represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holiday {
    /// December 25th
    Christmas,
    /// January 1st
    NewYear,
    /// Any other configured closure
    Other,
}

/// A day/month on which no bookings are accepted, every year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutDate {
    /// Day of month (1-31)
    pub day: u32,
    /// Month (1-12)
    pub month: u32,
    /// Holiday kind, which selects the rejection reason
    pub holiday: Holiday,
}

impl BlackoutDate {
    /// Creates a blackout date, classifying Christmas and New Year automatically.
    #[must_use]
    pub const fn new(day: u32, month: u32) -> Self {
        let holiday = match (day, month) {
            (25, 12) => Holiday::Christmas,
            (1, 1) => Holiday::NewYear,
            _ => Holiday::Other,
        };
        Self {
            day,
            month,
            holiday,
        }
    }

    /// Whether `date` falls on this blackout day.
    #[must_use]
    pub fn matches(&self, date: NaiveDate) -> bool {
        date.day() == self.day && date.month() == self.month
    }
}

/// Rule parameters consumed by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rules keyed by activity name; unknown activities get [`ActivityRule::default`]
    pub activities: BTreeMap<String, ActivityRule>,
    /// Earliest slot start time
    pub opening_time: NaiveTime,
    /// Latest slot start time (inclusive)
    pub last_start_time: NaiveTime,
    /// Slot grid spacing in minutes, anchored at `opening_time`
    pub slot_interval_minutes: u32,
    /// Yearly blackout dates
    pub blackout_dates: Vec<BlackoutDate>,
    /// Weekdays the park is closed
    pub closed_weekdays: Vec<Weekday>,
    /// How many calendar days ahead a slot may be booked
    pub advance_booking_days: u32,
    /// Park local time offset from UTC, in minutes east
    pub utc_offset_minutes: i32,
}

impl Default for RuleConfig {
    #[allow(clippy::expect_used)] // Literal times are always valid
    fn default() -> Self {
        let activities = [
            ("Palestra", ActivityRule::sized(12)),
            ("Tirolesa", ActivityRule::sized(8)),
            ("Safari", ActivityRule::new(0)),
            ("Jardinería", ActivityRule::new(0)),
        ]
        .into_iter()
        .map(|(name, rule)| (name.to_string(), rule))
        .collect();

        Self {
            activities,
            opening_time: NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time"),
            last_start_time: NaiveTime::from_hms_opt(18, 0, 0).expect("18:00 is a valid time"),
            slot_interval_minutes: 30,
            blackout_dates: vec![BlackoutDate::new(25, 12), BlackoutDate::new(1, 1)],
            closed_weekdays: vec![Weekday::Mon],
            advance_booking_days: 2,
            utc_offset_minutes: 0,
        }
    }
}

impl RuleConfig {
    /// Load rules from `PARK_*` environment variables, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load rules from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a value is present but malformed.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("PARK_ACTIVITY_RULES") {
            config.activities = parse_activity_rules("PARK_ACTIVITY_RULES", &raw)?;
        }
        if let Some(raw) = lookup("PARK_OPENING_TIME") {
            config.opening_time = parse_time("PARK_OPENING_TIME", &raw)?;
        }
        if let Some(raw) = lookup("PARK_LAST_START_TIME") {
            config.last_start_time = parse_time("PARK_LAST_START_TIME", &raw)?;
        }
        if let Some(raw) = lookup("PARK_SLOT_INTERVAL_MINUTES") {
            config.slot_interval_minutes = parse_number("PARK_SLOT_INTERVAL_MINUTES", &raw)?;
        }
        if let Some(raw) = lookup("PARK_BLACKOUT_DATES") {
            config.blackout_dates = parse_blackout_dates("PARK_BLACKOUT_DATES", &raw)?;
        }
        if let Some(raw) = lookup("PARK_CLOSED_WEEKDAYS") {
            config.closed_weekdays = parse_weekdays("PARK_CLOSED_WEEKDAYS", &raw)?;
        }
        if let Some(raw) = lookup("PARK_ADVANCE_BOOKING_DAYS") {
            config.advance_booking_days = parse_number("PARK_ADVANCE_BOOKING_DAYS", &raw)?;
        }
        if let Some(raw) = lookup("PARK_UTC_OFFSET_MINUTES") {
            config.utc_offset_minutes = parse_number("PARK_UTC_OFFSET_MINUTES", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero slot interval, an opening
    /// time after the last start time, or a UTC offset of a day or more.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_interval_minutes == 0 {
            return Err(ConfigError::invalid(
                "PARK_SLOT_INTERVAL_MINUTES",
                "0",
                "interval must be positive",
            ));
        }
        if self.opening_time > self.last_start_time {
            return Err(ConfigError::invalid(
                "PARK_OPENING_TIME",
                &self.opening_time.format("%H:%M").to_string(),
                "opening time is after the last start time",
            ));
        }
        if self.utc_offset().is_none() {
            return Err(ConfigError::invalid(
                "PARK_UTC_OFFSET_MINUTES",
                &self.utc_offset_minutes.to_string(),
                "offset must be less than 24 hours",
            ));
        }
        Ok(())
    }

    /// Replace the rule for one activity.
    #[must_use]
    pub fn with_activity(mut self, name: impl Into<String>, rule: ActivityRule) -> Self {
        self.activities.insert(name.into(), rule);
        self
    }

    /// Set the advance-booking window.
    #[must_use]
    pub fn with_advance_booking_days(mut self, days: u32) -> Self {
        self.advance_booking_days = days;
        self
    }

    /// Set the closed weekdays.
    #[must_use]
    pub fn with_closed_weekdays(mut self, weekdays: Vec<Weekday>) -> Self {
        self.closed_weekdays = weekdays;
        self
    }

    /// Add a blackout date.
    #[must_use]
    pub fn with_blackout_date(mut self, date: BlackoutDate) -> Self {
        self.blackout_dates.push(date);
        self
    }

    /// Set the park's UTC offset.
    #[must_use]
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Rule for `activity`, or the permissive default.
    #[must_use]
    pub fn rule_for(&self, activity: &str) -> ActivityRule {
        self.activities.get(activity).copied().unwrap_or_default()
    }

    /// Blackout entry matching `date`, if any.
    #[must_use]
    pub fn blackout_for(&self, date: NaiveDate) -> Option<&BlackoutDate> {
        self.blackout_dates.iter().find(|blackout| blackout.matches(date))
    }

    /// Whether the park is closed on `weekday`.
    #[must_use]
    pub fn is_closed_on(&self, weekday: Weekday) -> bool {
        self.closed_weekdays.contains(&weekday)
    }

    /// The park's fixed offset, or `None` if the configured minutes are out of range.
    #[must_use]
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }

    /// Convert an instant to park-local wall-clock time.
    ///
    /// An out-of-range offset (rejected by [`RuleConfig::validate`]) falls back to UTC.
    #[must_use]
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        self.utc_offset()
            .map_or_else(|| now.naive_utc(), |offset| now.with_timezone(&offset).naive_local())
    }
}

fn parse_activity_rules(key: &str, raw: &str) -> Result<BTreeMap<String, ActivityRule>, ConfigError> {
    let mut rules = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (name, spec) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::invalid(key, entry, "expected name=min_age[:sized]"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::invalid(key, entry, "activity name is empty"));
        }
        let (age, flag) = match spec.split_once(':') {
            Some((age, flag)) => (age.trim(), Some(flag.trim())),
            None => (spec.trim(), None),
        };
        let min_age = age
            .parse()
            .map_err(|e| ConfigError::invalid(key, entry, format!("bad minimum age: {e}")))?;
        let requires_size_class = match flag {
            None => false,
            Some("sized") => true,
            Some(other) => {
                return Err(ConfigError::invalid(
                    key,
                    entry,
                    format!("unknown flag {other:?}, expected \"sized\""),
                ));
            }
        };
        rules.insert(
            name.to_string(),
            ActivityRule {
                min_age,
                requires_size_class,
            },
        );
    }
    Ok(rules)
}

fn parse_time(key: &str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| ConfigError::invalid(key, raw, e.to_string()))
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e.to_string()))
}

fn parse_blackout_dates(key: &str, raw: &str) -> Result<Vec<BlackoutDate>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (day, month) = entry
                .split_once('-')
                .ok_or_else(|| ConfigError::invalid(key, entry, "expected DD-MM"))?;
            let day: u32 = parse_number(key, day)?;
            let month: u32 = parse_number(key, month)?;
            // 2024 is a leap year, so 29-02 is accepted.
            if NaiveDate::from_ymd_opt(2024, month, day).is_none() {
                return Err(ConfigError::invalid(key, entry, "not a calendar day"));
            }
            Ok(BlackoutDate::new(day, month))
        })
        .collect()
}

fn parse_weekdays(key: &str, raw: &str) -> Result<Vec<Weekday>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<Weekday>()
                .map_err(|_| ConfigError::invalid(key, entry, "unknown weekday"))
        })
        .collect()
}
