//! Header normalization.
//!
//! Logbook exports from other programs name their columns in every way
//! imaginable. Each header is cleaned up and then mapped onto the canonical
//! field vocabulary; headers that are not recognized pass through cleaned but
//! otherwise untouched, and are ignored further down the pipeline.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Every canonical field name, grouped by the row kind that uses it.
pub mod field {
    /// Columns that make up a flight.
    pub const FLIGHT: &[&str] = &[
        "date",
        "tailnumber",
        "type",
        "route",
        "total",
        "pic",
        "sic",
        "solo",
        "dual_r",
        "dual_g",
        "xc",
        "act_inst",
        "sim_inst",
        "night",
        "day_l",
        "night_l",
        "app",
        "person",
        "flight_number",
        "remarks",
    ];

    /// Columns that describe a plane.
    pub const PLANE: &[&str] = &[
        "tailnumber",
        "type",
        "manufacturer",
        "model",
        "cat_class",
        "tags",
    ];

    /// Columns of a non-flying event.
    pub const NON_FLIGHT: &[&str] = &["date", "non_flying", "event", "remarks"];

    /// Columns of the records blob.
    pub const RECORDS: &[&str] = &["records"];

    /// Columns of an airport or other location.
    pub const LOCATION: &[&str] = &["identifier", "municipality", "country", "loc_class"];
}

/// Headers written by other logbook programs, already cleaned, mapped to the
/// canonical field they carry.
const LEGACY_HEADERS: &[(&str, &str)] = &[
    ("FLIGHT DATE", "date"),
    ("A/C", "tailnumber"),
    ("AIRCRAFT ID", "tailnumber"),
    ("TAIL", "tailnumber"),
    ("TAIL NUMBER", "tailnumber"),
    ("REGISTRATION", "tailnumber"),
    ("A/C TYPE", "type"),
    ("AIRCRAFT TYPE", "type"),
    ("MAKE/MODEL", "type"),
    ("ROUTE OF FLIGHT", "route"),
    ("TOTAL TIME", "total"),
    ("TOTAL DURATION", "total"),
    ("DURATION", "total"),
    ("PILOT IN COMMAND", "pic"),
    ("SECOND IN COMMAND", "sic"),
    ("DUAL", "dual_r"),
    ("DUAL RECEIVED", "dual_r"),
    ("DUAL RCVD", "dual_r"),
    ("DUAL GIVEN", "dual_g"),
    ("CFI", "dual_g"),
    ("CROSS COUNTRY", "xc"),
    ("X-C", "xc"),
    ("X/C", "xc"),
    ("ACTUAL", "act_inst"),
    ("ACT INST", "act_inst"),
    ("ACTUAL INSTRUMENT", "act_inst"),
    ("IMC", "act_inst"),
    ("HOOD", "sim_inst"),
    ("SIM INST", "sim_inst"),
    ("SIMULATED INSTRUMENT", "sim_inst"),
    ("NIGHT TIME", "night"),
    ("LANDINGS", "day_l"),
    ("DAY LANDINGS", "day_l"),
    ("DAY LDG", "day_l"),
    ("NIGHT LANDINGS", "night_l"),
    ("NIGHT LDG", "night_l"),
    ("APPROACHES", "app"),
    ("APPS", "app"),
    ("INSTRUMENT APPROACHES", "app"),
    ("INSTRUCTOR", "person"),
    ("STUDENT", "person"),
    ("CREW", "person"),
    ("FLIGHT NUMBER", "flight_number"),
    ("FLIGHT #", "flight_number"),
    ("FLT NO", "flight_number"),
    ("COMMENTS", "remarks"),
    ("NOTES", "remarks"),
    ("MAKE", "manufacturer"),
    ("CATEGORY/CLASS", "cat_class"),
    ("CAT/CLASS", "cat_class"),
    ("CATEGORY CLASS", "cat_class"),
    ("NON FLYING", "non_flying"),
    ("NON-FLYING", "non_flying"),
    ("NONFLYING", "non_flying"),
    ("EVENT TYPE", "event"),
    ("AIRPORT", "identifier"),
    ("AIRPORT ID", "identifier"),
    ("CITY", "municipality"),
    ("LOCATION TYPE", "loc_class"),
    ("LOC CLASS", "loc_class"),
];

/// Cleaned header to canonical name. Every canonical name maps to itself
/// under its uppercased spelling, so normalized headers normalize to
/// themselves.
static COLUMN_NAMES: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let canonical = field::FLIGHT
        .iter()
        .chain(field::PLANE)
        .chain(field::NON_FLIGHT)
        .chain(field::RECORDS)
        .chain(field::LOCATION)
        .map(|name| (name.to_uppercase(), *name));

    let legacy = LEGACY_HEADERS
        .iter()
        .map(|(header, name)| ((*header).to_string(), *name));

    canonical.chain(legacy).collect()
});

static LINE_BREAKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*(?:\r\n|\r|\n)+[ \t]*").expect("line break pattern"));

/// Clean a single header: uppercase, trim, drop quotes and periods, and fold
/// embedded line breaks into one space.
#[must_use]
pub fn clean_header(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let stripped: String = upper.trim().chars().filter(|c| !matches!(c, '"' | '.')).collect();
    LINE_BREAKS.replace_all(&stripped, " ").trim().to_string()
}

/// Canonical name for a single header, or its cleaned form when unknown.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    let cleaned = clean_header(raw);
    match COLUMN_NAMES.get(&cleaned) {
        Some(name) => (*name).to_string(),
        None => cleaned,
    }
}

/// Normalize a header row. Length and order are preserved because values
/// are later bound to these names by position.
#[must_use]
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter().map(|h| normalize_header(h.as_ref())).collect()
}

/// Whether `name` belongs to the canonical vocabulary.
#[must_use]
pub fn is_canonical(name: &str) -> bool {
    COLUMN_NAMES.values().any(|canonical| *canonical == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header("  total time "), "TOTAL TIME");
        assert_eq!(clean_header("\"Flt. No.\""), "FLT NO");
        assert_eq!(clean_header("Night\r\nLandings"), "NIGHT LANDINGS");
        assert_eq!(clean_header("Day \n\n Ldg"), "DAY LDG");
    }

    #[test]
    fn test_normalize_typical_header() {
        let headers = normalize_headers(&["Date", "A/C", "Route", "Total Time"]);
        assert_eq!(headers, vec!["date", "tailnumber", "route", "total"]);
    }

    #[test]
    fn test_normalize_preserves_length_and_order() {
        let raw = ["Remarks", "Mystery Column", "PIC", "date"];
        let headers = normalize_headers(&raw);
        assert_eq!(headers.len(), raw.len());
        assert_eq!(headers, vec!["remarks", "MYSTERY COLUMN", "pic", "date"]);
    }

    #[test]
    fn test_unknown_headers_pass_through_cleaned() {
        assert_eq!(normalize_header(" fuel.burn "), "FUELBURN");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = [
            "Date",
            "A/C",
            "Night\nLandings",
            "Cat/Class",
            "whatever it is",
            "\"Flight #\"",
        ];
        let once = normalize_headers(&raw);
        let twice = normalize_headers(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonical_names_normalize_to_themselves() {
        for name in field::FLIGHT
            .iter()
            .chain(field::PLANE)
            .chain(field::NON_FLIGHT)
            .chain(field::RECORDS)
            .chain(field::LOCATION)
        {
            assert_eq!(normalize_header(name), *name);
        }
    }

    #[test]
    fn test_legacy_targets_are_canonical() {
        for (header, name) in LEGACY_HEADERS {
            assert!(is_canonical(name), "{header} maps to unknown field {name}");
            assert_eq!(clean_header(header), *header, "{header} is not pre-cleaned");
        }
    }

    #[test]
    fn test_is_canonical() {
        assert!(is_canonical("dual_r"));
        assert!(!is_canonical("DUAL_R"));
        assert!(!is_canonical("fuel"));
    }
}
