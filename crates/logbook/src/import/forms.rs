//! Validation of imported flights and events.
//!
//! Each form turns cleaned [`Fields`] into a typed record, or collects every
//! problem it finds into [`FieldErrors`] so the whole row can be reported at
//! once.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use super::classify::Fields;
use crate::error::FieldErrors;
use crate::model::{Flight, FlightTimes, NonFlight, NonFlightKind, UserId};

const REQUIRED: &str = "This field is required.";
const INVALID_DATE: &str = "Enter a valid date.";
const INVALID_NUMBER: &str = "Enter a number.";
const INVALID_COUNT: &str = "Enter a whole number.";
const NEGATIVE: &str = "Ensure this value is greater than or equal to 0.";

/// Allowed slack when comparing a time column against total time.
const EPSILON: f64 = 1e-6;

static HOURS_MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):([0-5]\d)$").expect("hours pattern"));

/// Parse a date in one of the layouts logbook programs export.
///
/// # Errors
///
/// Returns a user facing message when the value isn't a date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, &'static str> {
    let raw = raw.trim();
    let parsed = if raw.contains('/') {
        let year_digits = raw.rsplit('/').next().map_or(0, str::len);
        let layout = if year_digits == 2 { "%m/%d/%y" } else { "%m/%d/%Y" };
        NaiveDate::parse_from_str(raw, layout)
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    };
    parsed.map_err(|_| INVALID_DATE)
}

/// Parse a duration as decimal hours (`1.5`) or hours and minutes (`1:30`).
/// Empty means not given.
///
/// # Errors
///
/// Returns a user facing message when the value isn't a non-negative
/// duration.
pub fn parse_hours(raw: &str) -> Result<Option<f64>, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let value: f64 = match HOURS_MINUTES.captures(raw) {
        Some(caps) => {
            let hours: f64 = caps[1].parse().map_err(|_| INVALID_NUMBER)?;
            let minutes: f64 = caps[2].parse().map_err(|_| INVALID_NUMBER)?;
            hours + minutes / 60.0
        }
        None => raw.parse().map_err(|_| INVALID_NUMBER)?,
    };
    if !value.is_finite() {
        return Err(INVALID_NUMBER);
    }
    if value < 0.0 {
        return Err(NEGATIVE);
    }
    Ok(Some(value))
}

/// Parse a count such as landings. Empty means not given.
///
/// # Errors
///
/// Returns a user facing message when the value isn't a non-negative whole
/// number.
pub fn parse_count(raw: &str) -> Result<Option<u32>, &'static str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if raw.starts_with('-') {
        return Err(NEGATIVE);
    }
    raw.parse().map(Some).map_err(|_| INVALID_COUNT)
}

/// Validate a flight row that will be filed under `plane_id`.
///
/// # Errors
///
/// Returns every problem found, keyed by field.
pub fn validate_flight(
    fields: &Fields,
    user: UserId,
    plane_id: i64,
) -> Result<Flight, FieldErrors> {
    let mut errors = FieldErrors::new();

    let date = required_date(fields, &mut errors);

    let mut times = FlightTimes::default();
    for column in FlightTimes::COLUMNS {
        match parse_hours(fields.get(column)) {
            Ok(value) => times.set(column, value),
            Err(message) => errors.add(column, message),
        }
    }

    if let Some(total) = times.total {
        for column in FlightTimes::COLUMNS.iter().filter(|c| **c != "total") {
            if times.get(column).is_some_and(|value| value > total + EPSILON) {
                errors.add(*column, "Cannot exceed total time.");
            }
        }
    }

    let mut count = |column: &str| match parse_count(fields.get(column)) {
        Ok(value) => value,
        Err(message) => {
            errors.add(column, message);
            None
        }
    };
    let day_l = count("day_l");
    let night_l = count("night_l");
    let app = count("app");

    match date {
        Some(date) if errors.is_empty() => Ok(Flight {
            id: None,
            user,
            plane_id,
            date,
            route: fields.get("route").to_string(),
            times,
            day_l,
            night_l,
            app,
            person: fields.get("person").to_string(),
            flight_number: fields.get("flight_number").to_string(),
            remarks: fields.get("remarks").to_string(),
        }),
        _ => Err(errors),
    }
}

/// Validate a non-flying event row.
///
/// # Errors
///
/// Returns every problem found, keyed by field.
pub fn validate_non_flight(fields: &Fields, user: UserId) -> Result<NonFlight, FieldErrors> {
    let mut errors = FieldErrors::new();

    let date = required_date(fields, &mut errors);

    let kind = match fields.get("non_flying") {
        "" => {
            errors.add("non_flying", REQUIRED);
            None
        }
        raw => match raw.parse::<NonFlightKind>() {
            Ok(kind) => Some(kind),
            Err(message) => {
                errors.add("non_flying", message);
                None
            }
        },
    };

    match (date, kind) {
        (Some(date), Some(kind)) => Ok(NonFlight {
            id: None,
            user,
            date,
            kind,
            remarks: fields.get("remarks").to_string(),
        }),
        _ => Err(errors),
    }
}

fn required_date(fields: &Fields, errors: &mut FieldErrors) -> Option<NaiveDate> {
    match fields.get("date") {
        "" => {
            errors.add("date", REQUIRED);
            None
        }
        raw => match parse_date(raw) {
            Ok(date) => Some(date),
            Err(message) => {
                errors.add("date", message);
                None
            }
        },
    }
}
