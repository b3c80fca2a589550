//! Core logbook records.
//!
//! These are the rows the import pipeline writes and the storage layer reads
//! back: planes, flights, non-flight events, and the free-text records blob.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identity of the user that owns a set of logbook rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An aircraft belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plane {
    /// Row id (assigned by storage layer).
    pub id: i64,
    /// Owner of this plane record.
    pub user: UserId,
    /// Registration, e.g. `N12345`.
    pub tailnumber: String,
    /// Type designator, e.g. `C172`. Empty when unknown.
    #[serde(rename = "type")]
    pub plane_type: String,
    /// Manufacturer name.
    pub manufacturer: String,
    /// Model name.
    pub model: String,
    /// Category and class, e.g. `Airplane SEL`.
    pub cat_class: String,
    /// Space separated tags; tags containing spaces are double quoted.
    pub tags: String,
}

impl Plane {
    /// Individual tags, with quoting removed.
    #[must_use]
    pub fn tag_list(&self) -> Vec<String> {
        let mut tags = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        for ch in self.tags.chars() {
            match ch {
                '"' => quoted = !quoted,
                ' ' if !quoted => {
                    if !current.is_empty() {
                        tags.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(ch),
            }
        }
        if !current.is_empty() {
            tags.push(current);
        }
        tags
    }
}

/// A logged flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    /// Row id (assigned by storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owner of this flight.
    pub user: UserId,
    /// The plane flown.
    pub plane_id: i64,
    /// Date of the flight.
    pub date: NaiveDate,
    /// Route as written by the pilot, e.g. `KXXX-KYYY`.
    pub route: String,
    /// Block times in decimal hours.
    pub times: FlightTimes,
    /// Day landings.
    pub day_l: Option<u32>,
    /// Night landings.
    pub night_l: Option<u32>,
    /// Instrument approaches.
    pub app: Option<u32>,
    /// Instructor, student, or other crew member.
    pub person: String,
    /// Airline or charter flight number.
    pub flight_number: String,
    /// Free-form remarks.
    pub remarks: String,
}

/// Flight time columns, in decimal hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightTimes {
    /// Total time.
    pub total: Option<f64>,
    /// Pilot in command.
    pub pic: Option<f64>,
    /// Second in command.
    pub sic: Option<f64>,
    /// Solo.
    pub solo: Option<f64>,
    /// Dual received.
    pub dual_r: Option<f64>,
    /// Dual given.
    pub dual_g: Option<f64>,
    /// Cross country.
    pub xc: Option<f64>,
    /// Actual instrument.
    pub act_inst: Option<f64>,
    /// Simulated instrument.
    pub sim_inst: Option<f64>,
    /// Night.
    pub night: Option<f64>,
}

impl FlightTimes {
    /// Column names, in the order they appear in the database.
    pub const COLUMNS: [&'static str; 10] = [
        "total", "pic", "sic", "solo", "dual_r", "dual_g", "xc", "act_inst", "sim_inst", "night",
    ];

    /// Look up a column by name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<f64> {
        match column {
            "total" => self.total,
            "pic" => self.pic,
            "sic" => self.sic,
            "solo" => self.solo,
            "dual_r" => self.dual_r,
            "dual_g" => self.dual_g,
            "xc" => self.xc,
            "act_inst" => self.act_inst,
            "sim_inst" => self.sim_inst,
            "night" => self.night,
            _ => None,
        }
    }

    /// Set a column by name. Unknown names are ignored.
    pub fn set(&mut self, column: &str, value: Option<f64>) {
        let slot = match column {
            "total" => &mut self.total,
            "pic" => &mut self.pic,
            "sic" => &mut self.sic,
            "solo" => &mut self.solo,
            "dual_r" => &mut self.dual_r,
            "dual_g" => &mut self.dual_g,
            "xc" => &mut self.xc,
            "act_inst" => &mut self.act_inst,
            "sim_inst" => &mut self.sim_inst,
            "night" => &mut self.night,
            _ => return,
        };
        *slot = value;
    }
}

/// Kinds of non-flying events a pilot keeps track of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFlightKind {
    /// Biennial flight review.
    FlightReview,
    /// Instrument proficiency check.
    Ipc,
    /// Medical examination.
    Medical,
    /// Practical test.
    Checkride,
    /// Ground instruction.
    GroundSession,
}

impl NonFlightKind {
    /// All kinds, ordered by their numeric code.
    pub const ALL: [Self; 5] = [
        Self::FlightReview,
        Self::Ipc,
        Self::Medical,
        Self::Checkride,
        Self::GroundSession,
    ];

    /// Numeric code used by exported logbooks.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::FlightReview => 1,
            Self::Ipc => 2,
            Self::Medical => 3,
            Self::Checkride => 4,
            Self::GroundSession => 5,
        }
    }

    /// Look up a kind by numeric code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Human readable label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::FlightReview => "Flight Review",
            Self::Ipc => "IPC",
            Self::Medical => "Medical",
            Self::Checkride => "Checkride",
            Self::GroundSession => "Ground Session",
        }
    }
}

impl fmt::Display for NonFlightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NonFlightKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown event code {code}"));
        }

        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "flightreview" | "bfr" | "biennialflightreview" => Ok(Self::FlightReview),
            "ipc" | "instrumentproficiencycheck" => Ok(Self::Ipc),
            "medical" | "medicalexam" => Ok(Self::Medical),
            "checkride" | "practicaltest" => Ok(Self::Checkride),
            "groundsession" | "ground" | "groundschool" => Ok(Self::GroundSession),
            _ => Err(format!("unknown event \"{s}\"")),
        }
    }
}

/// A non-flying event such as a medical or a flight review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonFlight {
    /// Row id (assigned by storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owner of this event.
    pub user: UserId,
    /// When it happened.
    pub date: NaiveDate,
    /// What happened.
    pub kind: NonFlightKind,
    /// Free-form remarks.
    pub remarks: String,
}

/// The single free-text records blob each user keeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Records {
    /// Owner of the blob.
    pub user: UserId,
    /// The text itself.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_with_tags(tags: &str) -> Plane {
        Plane {
            id: 1,
            user: UserId(1),
            tailnumber: "N12345".to_string(),
            plane_type: "C172".to_string(),
            manufacturer: String::new(),
            model: String::new(),
            cat_class: String::new(),
            tags: tags.to_string(),
        }
    }

    #[test]
    fn test_tag_list_handles_quoted_tags() {
        let plane = plane_with_tags("Glass \"Tail Dragger\" Complex");
        assert_eq!(plane.tag_list(), vec!["Glass", "Tail Dragger", "Complex"]);
    }

    #[test]
    fn test_tag_list_empty() {
        assert!(plane_with_tags("").tag_list().is_empty());
    }

    #[test]
    fn test_flight_times_get_set() {
        let mut times = FlightTimes::default();
        times.set("dual_r", Some(1.2));
        times.set("bogus", Some(9.9));
        assert_eq!(times.get("dual_r"), Some(1.2));
        assert_eq!(times.get("bogus"), None);
        assert_eq!(times.get("total"), None);
    }

    #[test]
    fn test_flight_times_columns_are_all_addressable() {
        let mut times = FlightTimes::default();
        for column in FlightTimes::COLUMNS {
            times.set(column, Some(1.0));
            assert_eq!(times.get(column), Some(1.0), "{column}");
        }
    }

    #[test]
    fn test_non_flight_kind_codes_round_trip() {
        for kind in NonFlightKind::ALL {
            assert_eq!(NonFlightKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(NonFlightKind::from_code(0), None);
        assert_eq!(NonFlightKind::from_code(6), None);
    }

    #[test]
    fn test_non_flight_kind_from_str() {
        assert_eq!("3".parse::<NonFlightKind>(), Ok(NonFlightKind::Medical));
        assert_eq!(
            "Flight Review".parse::<NonFlightKind>(),
            Ok(NonFlightKind::FlightReview)
        );
        assert_eq!("ipc".parse::<NonFlightKind>(), Ok(NonFlightKind::Ipc));
        assert_eq!(
            " ground session ".parse::<NonFlightKind>(),
            Ok(NonFlightKind::GroundSession)
        );
        assert!("9".parse::<NonFlightKind>().is_err());
        assert!("tea party".parse::<NonFlightKind>().is_err());
    }

    #[test]
    fn test_non_flight_kind_display() {
        assert_eq!(NonFlightKind::Ipc.to_string(), "IPC");
        assert_eq!(NonFlightKind::GroundSession.to_string(), "Ground Session");
    }

    #[test]
    fn test_plane_serializes_type_field() {
        let json = serde_json::to_string(&plane_with_tags("")).unwrap();
        assert!(json.contains("\"type\":\"C172\""));
    }
}
