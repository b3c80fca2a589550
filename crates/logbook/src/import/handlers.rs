//! Per-section row handlers.
//!
//! [`Preview`] only renders. [`Commit`] validates and stores each row, then
//! reuses the preview rendering and appends a banner with the outcome.

use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use super::classify::{Fields, RowKind};
use super::forms::{validate_flight, validate_non_flight};
use super::render;
use super::ImportResult;
use crate::error::{self, Error, FieldErrors};
use crate::model::{Plane, UserId};
use crate::storage::Storage;

/// Output section a row lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Flights.
    Flight,
    /// Non-flying events, from either the `non_flying` or `event` column.
    NonFlight,
    /// The records blob.
    Records,
    /// Planes.
    Plane,
}

impl Section {
    /// All sections in report order.
    pub const ALL: [Self; 4] = [Self::Flight, Self::NonFlight, Self::Records, Self::Plane];

    /// Section handling rows of `kind`, if any.
    #[must_use]
    pub fn for_kind(kind: RowKind) -> Option<Self> {
        match kind {
            RowKind::Flight => Some(Self::Flight),
            RowKind::NonFlight | RowKind::Event => Some(Self::NonFlight),
            RowKind::Records => Some(Self::Records),
            RowKind::Plane => Some(Self::Plane),
            RowKind::Location | RowKind::Unrecognized => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flight => write!(f, "flight"),
            Self::NonFlight => write!(f, "nonflight"),
            Self::Records => write!(f, "records"),
            Self::Plane => write!(f, "plane"),
        }
    }
}

/// Turns one classified row into its [`ImportResult`].
pub trait RowHandler {
    /// Handle a row belonging to `section`.
    fn handle(&mut self, section: Section, fields: &Fields) -> ImportResult;
}

/// Renders rows without validating or storing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preview;

impl RowHandler for Preview {
    fn handle(&mut self, section: Section, fields: &Fields) -> ImportResult {
        ImportResult::Success {
            line: fields.line(),
            html: render::row(section, fields),
        }
    }
}

/// Validates rows and stores them for one user.
pub struct Commit<'a> {
    storage: &'a Storage,
    user: UserId,
    unknown_tailnumber: String,
}

impl<'a> Commit<'a> {
    /// Store rows in `storage` on behalf of `user`. Flights without a
    /// tailnumber are filed under the plane named `unknown_tailnumber`.
    pub fn new(storage: &'a Storage, user: UserId, unknown_tailnumber: impl Into<String>) -> Self {
        Self {
            storage,
            user,
            unknown_tailnumber: unknown_tailnumber.into(),
        }
    }

    fn resolve_plane(&self, fields: &Fields) -> error::Result<Plane> {
        match fields.get("tailnumber") {
            "" => self
                .storage
                .unknown_plane(self.user, &self.unknown_tailnumber),
            tailnumber => {
                let plane_type = Some(fields.get("type")).filter(|t| !t.is_empty());
                self.storage
                    .find_or_create_plane(self.user, tailnumber, plane_type)
            }
        }
    }

    fn commit_flight(&self, fields: &Fields) -> Result<(), FieldErrors> {
        let plane = self.resolve_plane(fields).map_err(storage_failure)?;
        let flight = validate_flight(fields, self.user, plane.id)?;
        let id = self.storage.insert_flight(&flight).map_err(storage_failure)?;
        trace!(id, plane = plane.id, "Stored flight");
        Ok(())
    }

    fn commit_non_flight(&self, fields: &Fields) -> Result<(), FieldErrors> {
        let event = validate_non_flight(fields, self.user)?;
        let id = self
            .storage
            .insert_non_flight(&event)
            .map_err(storage_failure)?;
        trace!(id, kind = %event.kind, "Stored non-flight event");
        Ok(())
    }

    fn commit_records(&self, fields: &Fields) -> Result<(), FieldErrors> {
        self.storage
            .upsert_records(self.user, fields.get("records"))
            .map_err(storage_failure)
    }

    fn commit_plane(&self, fields: &Fields) -> Result<(), FieldErrors> {
        let mut plane = self
            .storage
            .find_or_create_plane(self.user, fields.get("tailnumber"), Some(fields.get("type")))
            .map_err(storage_failure)?;

        plane.manufacturer = fields.get("manufacturer").to_string();
        plane.model = fields.get("model").to_string();
        plane.cat_class = fields.get("cat_class").to_string();
        plane.tags = normalize_tags(fields.get("tags"));

        self.storage.update_plane(&plane).map_err(storage_failure)?;
        trace!(
            id = plane.id,
            tailnumber = %plane.tailnumber,
            tags = ?plane.tag_list(),
            "Stored plane"
        );
        Ok(())
    }
}

impl RowHandler for Commit<'_> {
    fn handle(&mut self, section: Section, fields: &Fields) -> ImportResult {
        let outcome = match section {
            Section::Flight => self.commit_flight(fields),
            Section::NonFlight => self.commit_non_flight(fields),
            Section::Records => self.commit_records(fields),
            Section::Plane => self.commit_plane(fields),
        };

        let line = fields.line();
        let mut html = render::row(section, fields);
        match outcome {
            Ok(()) => {
                html.push_str(&render::good_banner());
                ImportResult::Success { line, html }
            }
            Err(errors) => {
                debug!(line, %section, %errors, "Line rejected");
                html.push_str(&render::bad_banner(&errors));
                ImportResult::Failure { line, html, errors }
            }
        }
    }
}

impl fmt::Debug for Commit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commit")
            .field("user", &self.user)
            .field("unknown_tailnumber", &self.unknown_tailnumber)
            .finish_non_exhaustive()
    }
}

fn storage_failure(error: Error) -> FieldErrors {
    FieldErrors::general(error.to_string())
}

/// Turn a comma separated tag list into the space separated form planes
/// store. Tags containing a space are double quoted.
#[must_use]
pub fn normalize_tags(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            if tag.contains(' ') {
                format!("\"{tag}\"")
            } else {
                tag.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::classify::classify;
    use crate::import::reader::RawRow;
    use crate::model::NonFlightKind;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        classify(RawRow::new(2, pairs.iter().copied())).1
    }

    fn setup() -> (Storage, UserId) {
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.ensure_user("alice").unwrap();
        (storage, user)
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(normalize_tags("High Wing, IFR,  Complex "), "\"High Wing\" IFR Complex");
        assert_eq!(normalize_tags(""), "");
        assert_eq!(normalize_tags("a,,b"), "a b");
    }

    #[test]
    fn test_normalized_tags_parse_back() {
        let plane = Plane {
            id: 1,
            user: UserId(1),
            tailnumber: "N1".into(),
            plane_type: String::new(),
            manufacturer: String::new(),
            model: String::new(),
            cat_class: String::new(),
            tags: normalize_tags("High Wing, IFR"),
        };
        assert_eq!(plane.tag_list(), vec!["High Wing", "IFR"]);
    }

    #[test]
    fn test_section_for_kind() {
        assert_eq!(Section::for_kind(RowKind::Event), Some(Section::NonFlight));
        assert_eq!(Section::for_kind(RowKind::NonFlight), Some(Section::NonFlight));
        assert_eq!(Section::for_kind(RowKind::Location), None);
        assert_eq!(Section::for_kind(RowKind::Unrecognized), None);
    }

    #[test]
    fn test_preview_never_fails() {
        let fields = fields(&[("date", "garbage"), ("total", "lots")]);
        let result = Preview.handle(Section::Flight, &fields);
        assert!(result.is_success());
        assert!(result.html().contains("<td class='total'>lots</td>"));
    }

    #[test]
    fn test_commit_flight_creates_plane() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");
        let fields = fields(&[
            ("date", "2020-01-01"),
            ("tailnumber", "N12345"),
            ("route", "KXXX-KYYY"),
            ("total", "1.5"),
        ]);

        let result = commit.handle(Section::Flight, &fields);

        assert!(result.is_success());
        assert!(result.html().contains("<tr class='good'>"));
        let planes = storage.planes(user).unwrap();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].tailnumber, "N12345");
        let flights = storage.flights(user).unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].plane_id, planes[0].id);
    }

    #[test]
    fn test_commit_flight_reuses_plane() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");
        for date in ["2020-01-01", "2020-01-02"] {
            let fields = fields(&[("date", date), ("tailnumber", "N1"), ("total", "1")]);
            assert!(commit.handle(Section::Flight, &fields).is_success());
        }
        assert_eq!(storage.planes(user).unwrap().len(), 1);
        assert_eq!(storage.flights(user).unwrap().len(), 2);
    }

    #[test]
    fn test_commit_flight_without_tailnumber_uses_unknown_plane() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");
        let fields = fields(&[("date", "2020-01-01"), ("total", "1.0")]);

        assert!(commit.handle(Section::Flight, &fields).is_success());

        let planes = storage.planes(user).unwrap();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].tailnumber, "UNKNOWN");
    }

    #[test]
    fn test_commit_invalid_flight_reports_errors() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");
        let fields = fields(&[("date", "2020-01-01"), ("tailnumber", "N1"), ("total", "1.5.1")]);

        let result = commit.handle(Section::Flight, &fields);

        let ImportResult::Failure { errors, html, .. } = result else {
            panic!("expected failure");
        };
        assert!(errors.get("total").is_some());
        assert!(html.contains("<tr class='bad'>"));
        assert!(storage.flights(user).unwrap().is_empty());
    }

    #[test]
    fn test_commit_non_flight() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");
        let fields = fields(&[("date", "2020-05-05"), ("event", "IPC")]);

        assert!(commit.handle(Section::NonFlight, &fields).is_success());

        let events = storage.non_flights(user).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, NonFlightKind::Ipc);
    }

    #[test]
    fn test_commit_records_overwrites() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");

        for text in ["first", "second"] {
            let result = commit.handle(Section::Records, &fields(&[("records", text)]));
            assert!(result.html().contains("<tr class='good'>"));
        }

        assert_eq!(storage.records(user).unwrap().unwrap().text, "second");
    }

    #[test]
    fn test_commit_plane_upsert_overwrites() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");

        let first = fields(&[
            ("tailnumber", "N12345"),
            ("type", "C172"),
            ("manufacturer", "Cessna"),
            ("tags", "High Wing"),
        ]);
        let second = fields(&[
            ("tailnumber", "N12345"),
            ("type", "C172"),
            ("manufacturer", "Textron"),
            ("model", "Skyhawk"),
            ("cat_class", "Airplane SEL"),
            ("tags", "High Wing, IFR"),
        ]);
        assert!(commit.handle(Section::Plane, &first).is_success());
        assert!(commit.handle(Section::Plane, &second).is_success());

        let planes = storage.planes(user).unwrap();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].manufacturer, "Textron");
        assert_eq!(planes[0].model, "Skyhawk");
        assert_eq!(planes[0].cat_class, "Airplane SEL");
        assert_eq!(planes[0].tags, "\"High Wing\" IFR");
    }

    #[test]
    fn test_commit_plane_different_type_is_separate() {
        let (storage, user) = setup();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");

        commit.handle(Section::Plane, &fields(&[("tailnumber", "N1"), ("type", "C172")]));
        commit.handle(Section::Plane, &fields(&[("tailnumber", "N1"), ("type", "C182")]));

        assert_eq!(storage.planes(user).unwrap().len(), 2);
    }

    #[test]
    fn test_commit_plane_storage_error_is_row_failure() {
        let (storage, user) = setup();
        storage
            .execute_batch(
                "CREATE TRIGGER reject_n1 BEFORE UPDATE ON planes
                 WHEN NEW.tailnumber = 'N1'
                 BEGIN SELECT RAISE(ABORT, 'conflict'); END;",
            )
            .unwrap();
        let mut commit = Commit::new(&storage, user, "UNKNOWN");

        let rejected = commit.handle(Section::Plane, &fields(&[("tailnumber", "N1")]));
        let accepted = commit.handle(Section::Plane, &fields(&[("tailnumber", "N2")]));

        let errors = rejected.errors().unwrap();
        let general = errors.get("__all__").unwrap();
        assert!(general[0].contains("conflict"));
        assert!(rejected.html().contains("class='bad'"));
        assert!(accepted.is_success());
    }
}
