//! Row classification.
//!
//! Decides what a data row describes from which canonical fields it fills
//! in. A single upload may mix flights, planes, events and the records blob,
//! which is how full logbook backups are laid out.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::headers::field;
use super::reader::RawRow;

/// What a data row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    /// A logged flight.
    Flight,
    /// A non-flying event given in the `non_flying` column.
    NonFlight,
    /// A non-flying event given in the older `event` column.
    Event,
    /// The free-text records blob.
    Records,
    /// A plane description.
    Plane,
    /// An airport or other location. Not imported.
    Location,
    /// Nothing this importer knows how to handle.
    Unrecognized,
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flight => "flight",
            Self::NonFlight => "nonflight",
            Self::Event => "event",
            Self::Records => "records",
            Self::Plane => "plane",
            Self::Location => "location",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Cleaned values of a classified row.
///
/// Values are trimmed, and every canonical field is present, empty when the
/// file didn't supply it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fields {
    line: u64,
    values: BTreeMap<String, String>,
}

impl Fields {
    /// One-based physical line the row started on.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Value of `name`, or `""` when it is unknown or empty.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }

    /// Whether `name` has a non-empty value.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        !self.get(name).is_empty()
    }

    /// Whether any of `names` has a non-empty value.
    #[must_use]
    pub fn any_set(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.is_set(name))
    }

    /// Names of all fields with a non-empty value.
    pub fn populated(&self) -> impl Iterator<Item = &str> {
        self.values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.as_str())
    }
}

/// Classify `row` and clean its values.
#[must_use]
pub fn classify(row: RawRow) -> (RowKind, Fields) {
    let line = row.line();
    let mut values: BTreeMap<String, String> = row
        .into_fields()
        .into_iter()
        .map(|(k, v)| (k, v.trim().to_string()))
        .collect();

    for name in field::FLIGHT
        .iter()
        .chain(field::PLANE)
        .chain(field::NON_FLIGHT)
        .chain(field::RECORDS)
        .chain(field::LOCATION)
    {
        values.entry((*name).to_string()).or_default();
    }

    let mut fields = Fields { line, values };
    let kind = kind_of(&fields);

    if kind == RowKind::Event && !fields.is_set("non_flying") {
        let event = fields.get("event").to_string();
        fields.values.insert("non_flying".to_string(), event);
    }

    (kind, fields)
}

fn kind_of(fields: &Fields) -> RowKind {
    if fields.is_set("records") {
        return RowKind::Records;
    }
    if fields.is_set("non_flying") {
        return RowKind::NonFlight;
    }
    if fields.is_set("event") {
        return RowKind::Event;
    }

    let flight_detail = field::FLIGHT
        .iter()
        .filter(|name| **name != "date")
        .any(|name| fields.is_set(name));

    if fields.is_set("date") {
        if flight_detail {
            return RowKind::Flight;
        }
    } else if fields.any_set(field::PLANE) {
        return RowKind::Plane;
    }

    if fields.any_set(field::LOCATION) {
        return RowKind::Location;
    }

    RowKind::Unrecognized
}
