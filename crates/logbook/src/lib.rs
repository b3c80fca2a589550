//! `logbook` - A personal flight logbook
//!
//! This library provides the logbook's storage and the import pipeline that
//! reads flights, planes, events and records out of comma or tab separated
//! exports, either as a preview or by committing them to the database.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod model;
pub mod storage;

pub use config::Config;
pub use error::{Error, FieldErrors, Result};
pub use import::{ImportOptions, ImportReport, ImportResult, ImportSession, Section, Stage};
pub use logging::init_logging;
pub use model::{Flight, FlightTimes, NonFlight, NonFlightKind, Plane, Records, UserId};
pub use storage::{Storage, StorageStats};
