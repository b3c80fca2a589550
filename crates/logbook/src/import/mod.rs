//! Delimited logbook import.
//!
//! An upload goes through a fixed sequence of stages: its dialect is sniffed,
//! its header row is read and normalized, and then every data row is
//! classified and handed to a [`RowHandler`]. Results are collected per
//! [`Section`] in the order the rows appear in the file.
//!
//! Two handlers exist. [`Preview`] renders rows for review and never touches
//! storage; [`Commit`] validates and stores them.
//!
//! A row that can't be classified aborts the import with
//! [`Error::Structural`]. Rows that fail validation don't abort anything;
//! they become [`ImportResult::Failure`] entries next to their rendering.

pub mod classify;
pub mod dialect;
pub mod forms;
pub mod handlers;
pub mod headers;
pub mod reader;
pub mod render;

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::io::{Read, Seek};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

pub use classify::{Fields, RowKind};
pub use dialect::Dialect;
pub use handlers::{Commit, Preview, RowHandler, Section};
pub use reader::{RawRow, RowReader};

use crate::config::{Config, DEFAULT_SAMPLE_SIZE};
use crate::error::{Error, FieldErrors, Result};
use crate::model::UserId;
use crate::storage::Storage;

/// Progress of an [`ImportSession`]. Stages only move forward; a failed
/// session stays at the last stage it reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing has been read yet.
    Created,
    /// The dialect is known.
    DialectSniffed,
    /// The header row has been read and normalized.
    HeaderNormalized,
    /// Data rows are being handled.
    Streaming,
    /// Every row has been handled and section headers are built.
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::DialectSniffed => write!(f, "dialect sniffed"),
            Self::HeaderNormalized => write!(f, "header normalized"),
            Self::Streaming => write!(f, "streaming"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// Knobs for a single import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    /// Read the upload as tab separated without sniffing.
    pub force_tsv: bool,
    /// Bytes inspected when sniffing the dialect.
    pub sample_size: usize,
    /// Roll back every stored row when a committing import aborts.
    pub atomic_commit: bool,
    /// Tail number of the plane flights without one are filed under.
    pub unknown_tailnumber: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            force_tsv: false,
            sample_size: DEFAULT_SAMPLE_SIZE,
            atomic_commit: true,
            unknown_tailnumber: "UNKNOWN".to_string(),
        }
    }
}

impl ImportOptions {
    /// Options taken from the `[import]` configuration section.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            force_tsv: false,
            sample_size: config.import.sample_size,
            atomic_commit: config.import.atomic_commit,
            unknown_tailnumber: config.import.unknown_tailnumber.clone(),
        }
    }
}

/// Outcome of handling one data row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportResult {
    /// The row was rendered, and in commit mode stored.
    Success {
        /// Line the row started on.
        line: u64,
        /// Rendered table rows.
        html: String,
    },
    /// The row was rejected.
    Failure {
        /// Line the row started on.
        line: u64,
        /// Rendered table rows, including the error banner.
        html: String,
        /// Why the row was rejected.
        errors: FieldErrors,
    },
}

impl ImportResult {
    /// Line the row started on.
    #[must_use]
    pub fn line(&self) -> u64 {
        match self {
            Self::Success { line, .. } | Self::Failure { line, .. } => *line,
        }
    }

    /// Rendered fragment.
    #[must_use]
    pub fn html(&self) -> &str {
        match self {
            Self::Success { html, .. } | Self::Failure { html, .. } => html,
        }
    }

    /// Whether the row went through.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Validation errors of a rejected row.
    #[must_use]
    pub fn errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { errors, .. } => Some(errors),
        }
    }
}

/// Row counts for one section of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionSummary {
    /// The section counted.
    pub section: Section,
    /// Rows handled.
    pub rows: usize,
    /// Rows rendered or stored without complaint.
    pub succeeded: usize,
    /// Rows rejected.
    pub failed: usize,
}

/// Everything an import produced, grouped by section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    flight: Vec<ImportResult>,
    non_flight: Vec<ImportResult>,
    records: Vec<ImportResult>,
    plane: Vec<ImportResult>,
    #[serde(skip)]
    headers: BTreeMap<Section, String>,
}

impl ImportReport {
    /// Results for `section`, in file order.
    #[must_use]
    pub fn section(&self, section: Section) -> &[ImportResult] {
        match section {
            Section::Flight => &self.flight,
            Section::NonFlight => &self.non_flight,
            Section::Records => &self.records,
            Section::Plane => &self.plane,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut Vec<ImportResult> {
        match section {
            Section::Flight => &mut self.flight,
            Section::NonFlight => &mut self.non_flight,
            Section::Records => &mut self.records,
            Section::Plane => &mut self.plane,
        }
    }

    /// Header row for `section`. Present once the import has finished.
    #[must_use]
    pub fn header(&self, section: Section) -> Option<&str> {
        self.headers.get(&section).map(String::as_str)
    }

    /// Number of results across all sections.
    #[must_use]
    pub fn len(&self) -> usize {
        Section::ALL.iter().map(|s| self.section(*s).len()).sum()
    }

    /// Whether no rows were handled at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rejected rows across all sections.
    #[must_use]
    pub fn failures(&self) -> usize {
        Section::ALL
            .iter()
            .flat_map(|s| self.section(*s))
            .filter(|r| !r.is_success())
            .count()
    }

    /// Per-section counts, in report order.
    #[must_use]
    pub fn summary(&self) -> Vec<SectionSummary> {
        Section::ALL
            .iter()
            .map(|&section| {
                let results = self.section(section);
                let failed = results.iter().filter(|r| !r.is_success()).count();
                SectionSummary {
                    section,
                    rows: results.len(),
                    succeeded: results.len() - failed,
                    failed,
                }
            })
            .collect()
    }

    /// One table per non-empty section, header first.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for section in Section::ALL {
            let results = self.section(section);
            if results.is_empty() {
                continue;
            }
            let _ = write!(out, "<table class=\"import {section}\">");
            match self.header(section) {
                Some(header) => out.push_str(header),
                None => out.push_str(&render::header(section)),
            }
            for result in results {
                out.push_str(result.html());
            }
            out.push_str("</table>\n");
        }
        out
    }
}

/// One pass over one uploaded file.
///
/// The session owns the upload and the accumulated results. It can be run
/// once; starting over means opening a new session on the file.
pub struct ImportSession<R> {
    source: R,
    options: ImportOptions,
    stage: Stage,
    headers: Vec<String>,
    report: ImportReport,
}

impl<R: Read + Seek> ImportSession<R> {
    /// Open a session over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFile`] when there is no file to import.
    pub fn new(source: Option<R>, options: &ImportOptions) -> Result<Self> {
        let source = source.ok_or(Error::NoFile)?;
        Ok(Self {
            source,
            options: options.clone(),
            stage: Stage::Created,
            headers: Vec::new(),
            report: ImportReport::default(),
        })
    }

    /// Stage the session has reached.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Normalized header row, once read.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Results gathered so far.
    #[must_use]
    pub fn report(&self) -> &ImportReport {
        &self.report
    }

    /// Read the whole upload, handing each row to `handler`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFormat`] if the dialect or header row can't be
    ///   determined, or a row can't be read.
    /// - [`Error::Structural`] on the first row that isn't recognized.
    /// - [`Error::Internal`] if the session has already run.
    pub fn run<H: RowHandler + ?Sized>(&mut self, handler: &mut H) -> Result<()> {
        if self.stage != Stage::Created {
            return Err(Error::internal(format!(
                "import session already ran (stage: {})",
                self.stage
            )));
        }

        let dialect = Dialect::sniff(
            &mut self.source,
            self.options.force_tsv,
            self.options.sample_size,
        )?;
        self.advance(Stage::DialectSniffed);

        let reader = RowReader::new(&mut self.source, &dialect)?;
        self.headers = reader.headers().to_vec();
        enter(&mut self.stage, Stage::HeaderNormalized);

        enter(&mut self.stage, Stage::Streaming);
        for row in reader {
            let (kind, fields) = classify::classify(row?);

            let Some(section) = Section::for_kind(kind) else {
                if kind == RowKind::Location {
                    debug!(line = fields.line(), "Skipping location row");
                    continue;
                }
                let populated: Vec<&str> = fields.populated().collect();
                warn!(
                    line = fields.line(),
                    fields = ?populated,
                    "Unrecognized row, aborting import"
                );
                return Err(Error::structural(fields.line(), populated));
            };

            let result = handler.handle(section, &fields);
            trace!(
                line = result.line(),
                %kind,
                success = result.is_success(),
                "Handled row"
            );
            self.report.section_mut(section).push(result);
        }

        for section in Section::ALL {
            self.report.headers.insert(section, render::header(section));
        }
        self.advance(Stage::Finalized);

        for summary in self.report.summary() {
            if summary.rows > 0 {
                info!(
                    section = %summary.section,
                    rows = summary.rows,
                    failed = summary.failed,
                    "Import section complete"
                );
            }
        }
        Ok(())
    }

    /// Give up the session, keeping its results.
    #[must_use]
    pub fn into_report(self) -> ImportReport {
        self.report
    }

    fn advance(&mut self, next: Stage) {
        enter(&mut self.stage, next);
    }
}

impl<R> fmt::Debug for ImportSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportSession")
            .field("options", &self.options)
            .field("stage", &self.stage)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

fn enter(stage: &mut Stage, next: Stage) {
    debug_assert!(next > *stage, "import stages only move forward");
    debug!(from = %stage, to = %next, "Import stage");
    *stage = next;
}

/// Render `source` for review without storing anything.
///
/// # Errors
///
/// See [`ImportSession::run`]; also [`Error::NoFile`] when `source` is
/// `None`.
pub fn preview<R: Read + Seek>(source: Option<R>, options: &ImportOptions) -> Result<ImportReport> {
    let mut session = ImportSession::new(source, options)?;
    session.run(&mut Preview)?;
    Ok(session.into_report())
}

/// Validate and store every row of `source` for `user`.
///
/// With [`ImportOptions::atomic_commit`] the whole run is one transaction and
/// an aborted import stores nothing. Otherwise rows stored before the abort
/// are kept.
///
/// # Errors
///
/// See [`ImportSession::run`]; also [`Error::NoFile`] when `source` is
/// `None`, and database errors from opening or committing the transaction.
pub fn commit<R: Read + Seek>(
    storage: &Storage,
    user: UserId,
    source: Option<R>,
    options: &ImportOptions,
) -> Result<ImportReport> {
    let mut session = ImportSession::new(source, options)?;
    let mut handler = Commit::new(storage, user, options.unknown_tailnumber.as_str());

    if options.atomic_commit {
        let tx = storage.transaction()?;
        session.run(&mut handler)?;
        tx.commit()?;
    } else {
        session.run(&mut handler)?;
    }

    Ok(session.into_report())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const SAMPLE_EXPORT: &str = "Date,A/C,Route,Total Time\n2020-01-01,N12345,KXXX-KYYY,1.5\n";

    fn upload(text: &str) -> Option<Cursor<Vec<u8>>> {
        Some(Cursor::new(text.as_bytes().to_vec()))
    }

    fn setup() -> (Storage, UserId) {
        crate::logging::init_test_logging();
        let storage = Storage::open_in_memory().unwrap();
        let user = storage.ensure_user("alice").unwrap();
        (storage, user)
    }

    #[test]
    fn test_no_file() {
        let err = ImportSession::<Cursor<Vec<u8>>>::new(None, &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, Error::NoFile));
    }

    #[test]
    fn test_preview_example() {
        let report = preview(upload(SAMPLE_EXPORT), &ImportOptions::default()).unwrap();

        let flights = report.section(Section::Flight);
        assert_eq!(flights.len(), 1);
        assert!(flights[0].is_success());
        assert_eq!(flights[0].line(), 2);
        let html = flights[0].html();
        for value in ["2020-01-01", "N12345", "KXXX-KYYY", "1.5"] {
            assert!(html.contains(value), "{value} missing from {html}");
        }
        assert!(!html.contains("class='good'"));
        assert!(report.header(Section::Flight).is_some());
    }

    #[test]
    fn test_commit_example() {
        let (storage, user) = setup();

        let report = commit(&storage, user, upload(SAMPLE_EXPORT), &ImportOptions::default()).unwrap();

        assert_eq!(report.len(), 1);
        assert!(report.section(Section::Flight)[0].html().contains("<tr class='good'>"));
        let planes = storage.planes(user).unwrap();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].tailnumber, "N12345");
        let flights = storage.flights(user).unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].times.total, Some(1.5));
    }

    #[test]
    fn test_commit_example_malformed_total() {
        let (storage, user) = setup();
        let text = "Date,A/C,Route,Total Time\n2020-01-01,N12345,KXXX-KYYY,1.x\n";

        let report = commit(&storage, user, upload(text), &ImportOptions::default()).unwrap();

        let result = &report.section(Section::Flight)[0];
        assert!(!result.is_success());
        assert!(result.errors().unwrap().get("total").is_some());
        assert!(result.html().contains("<tr class='bad'>"));
        assert!(storage.flights(user).unwrap().is_empty());
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn test_rows_partitioned_in_order() {
        let text = "\
date,tailnumber,type,total,non_flying,records,manufacturer,identifier
2020-01-01,N1,C172,1.0,,,,
,N1,C172,,,,Cessna,
2020-01-02,,,,Medical,,,
,,,,,,,KXXX
2020-01-03,N2,,2.0,,,,
,,,,,Longest flight 5.2,,
2020-01-04,N1,C172,0.8,,,,
";
        let report = preview(upload(text), &ImportOptions::default()).unwrap();

        let lines = |section| {
            report
                .section(section)
                .iter()
                .map(ImportResult::line)
                .collect::<Vec<_>>()
        };
        assert_eq!(lines(Section::Flight), vec![2, 6, 8]);
        assert_eq!(lines(Section::Plane), vec![3]);
        assert_eq!(lines(Section::NonFlight), vec![4]);
        assert_eq!(lines(Section::Records), vec![7]);
        // The location row on line 5 is dropped silently
        assert_eq!(report.len(), 6);
    }

    #[test]
    fn test_location_rows_are_dropped() {
        let text = "identifier,municipality,country\nKXXX,Springfield,US\nKYYY,Shelbyville,US\n";
        let report = preview(upload(text), &ImportOptions::default()).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_unrecognized_row_aborts() {
        let text = "date,total,fuel\n2020-01-01,1.0,\n,,20\n2020-01-02,1.0,\n";
        let mut session = ImportSession::new(upload(text), &ImportOptions::default()).unwrap();

        let err = session.run(&mut Preview).unwrap_err();

        assert!(err.is_structural());
        assert!(err.to_string().contains("FUEL"));
        assert_eq!(session.stage(), Stage::Streaming);
        assert_eq!(session.report().section(Section::Flight).len(), 1);
    }

    #[test]
    fn test_empty_file_is_invalid_format() {
        let mut session = ImportSession::new(upload(""), &ImportOptions::default()).unwrap();
        let err = session.run(&mut Preview).unwrap_err();
        assert!(err.is_invalid_format());
        assert_eq!(session.stage(), Stage::Created);
        assert!(session.report().is_empty());
    }

    #[test]
    fn test_forced_tsv_empty_file_has_no_header() {
        let options = ImportOptions {
            force_tsv: true,
            ..ImportOptions::default()
        };
        let mut session = ImportSession::new(upload(""), &options).unwrap();
        let err = session.run(&mut Preview).unwrap_err();
        assert!(err.is_invalid_format());
        assert_eq!(session.stage(), Stage::DialectSniffed);
        assert!(session.report().is_empty());
    }

    #[test]
    fn test_forced_tsv() {
        let options = ImportOptions {
            force_tsv: true,
            ..ImportOptions::default()
        };
        let text = "Date\tA/C\tTotal Time\n2020-01-01\tN1\t1.0\n";
        let report = preview(upload(text), &options).unwrap();
        assert_eq!(report.section(Section::Flight).len(), 1);
    }

    #[test]
    fn test_session_runs_once() {
        let mut session = ImportSession::new(upload(SAMPLE_EXPORT), &ImportOptions::default()).unwrap();
        session.run(&mut Preview).unwrap();
        assert_eq!(session.stage(), Stage::Finalized);
        assert_eq!(session.headers(), ["date", "tailnumber", "route", "total"]);

        let err = session.run(&mut Preview).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_atomic_commit_rolls_back_on_abort() {
        let (storage, user) = setup();
        let text = "date,tailnumber,total,fuel\n2020-01-01,N1,1.0,\n,,,20\n";

        let err = commit(&storage, user, upload(text), &ImportOptions::default()).unwrap_err();

        assert!(err.is_structural());
        assert!(storage.flights(user).unwrap().is_empty());
        assert!(storage.planes(user).unwrap().is_empty());
    }

    #[test]
    fn test_best_effort_commit_keeps_earlier_rows() {
        let (storage, user) = setup();
        let options = ImportOptions {
            atomic_commit: false,
            ..ImportOptions::default()
        };
        let text = "date,tailnumber,total,fuel\n2020-01-01,N1,1.0,\n,,,20\n";

        let err = commit(&storage, user, upload(text), &options).unwrap_err();

        assert!(err.is_structural());
        assert_eq!(storage.flights(user).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_plane_rows_dedupe() {
        let (storage, user) = setup();
        let text = "\
tailnumber,type,manufacturer,model,tags
N12345,C172,Cessna,172N,High Wing
N12345,C172,Cessna,172P,\"High Wing, IFR\"
";
        let report = commit(&storage, user, upload(text), &ImportOptions::default()).unwrap();

        assert_eq!(report.section(Section::Plane).len(), 2);
        let planes = storage.planes(user).unwrap();
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].model, "172P");
        assert_eq!(planes[0].tags, "\"High Wing\" IFR");
    }

    #[test]
    fn test_atomic_commit_survives_plane_storage_error() {
        let (storage, user) = setup();
        storage
            .execute_batch(
                "CREATE TRIGGER reject_n1 BEFORE UPDATE ON planes
                 WHEN NEW.tailnumber = 'N1'
                 BEGIN SELECT RAISE(ABORT, 'conflict'); END;",
            )
            .unwrap();
        let text = "tailnumber,type,manufacturer\nN1,C172,Cessna\nN2,PA28,Piper\n";

        let report = commit(&storage, user, upload(text), &ImportOptions::default()).unwrap();

        let results = report.section(Section::Plane);
        assert!(!results[0].is_success());
        assert!(results[0].errors().unwrap().get("__all__").is_some());
        assert!(results[0].html().contains("class='bad'"));
        assert!(results[1].is_success());

        let planes = storage.planes(user).unwrap();
        let n2 = planes.iter().find(|p| p.tailnumber == "N2").unwrap();
        assert_eq!(n2.manufacturer, "Piper");
    }

    #[test]
    fn test_commit_validation_failure_does_not_abort() {
        let (storage, user) = setup();
        let text = "date,tailnumber,total\nbad-date,N1,1.0\n2020-01-02,N1,1.0\n";

        let report = commit(&storage, user, upload(text), &ImportOptions::default()).unwrap();

        let results = report.section(Section::Flight);
        assert!(!results[0].is_success());
        assert!(results[1].is_success());
        assert_eq!(storage.flights(user).unwrap().len(), 1);
    }

    #[test]
    fn test_report_to_html() {
        let text = "date,tailnumber,total,records\n2020-01-01,N1,1.0,\n,,,Longest XC\n";
        let report = preview(upload(text), &ImportOptions::default()).unwrap();

        let html = report.to_html();
        assert_eq!(html.matches("<table").count(), 2);
        assert!(html.contains("<table class=\"import flight\"><tr class=\"header\">"));
        assert!(html.contains("<td class='records'>Longest XC</td>"));
        assert!(!html.contains("import plane"));
    }

    #[test]
    fn test_report_summary_and_json() {
        let (storage, user) = setup();
        let text = "date,tailnumber,total\n2020-01-01,N1,x\n2020-01-02,N1,1.0\n";
        let report = commit(&storage, user, upload(text), &ImportOptions::default()).unwrap();

        let flights = report.summary()[0];
        assert_eq!(flights.section, Section::Flight);
        assert_eq!((flights.rows, flights.succeeded, flights.failed), (2, 1, 1));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["flight"][0]["status"], "failure");
        assert_eq!(json["flight"][1]["status"], "success");
        assert!(json["flight"][0]["errors"]["total"].is_array());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.import.sample_size = 512;
        config.import.atomic_commit = false;
        config.import.unknown_tailnumber = "N/A".to_string();

        let options = ImportOptions::from_config(&config);
        assert_eq!(options.sample_size, 512);
        assert!(!options.atomic_commit);
        assert_eq!(options.unknown_tailnumber, "N/A");
        assert!(!options.force_tsv);
    }
}
