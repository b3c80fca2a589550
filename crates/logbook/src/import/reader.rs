//! Row reading.
//!
//! Reads the header row, normalizes it, and then yields one [`RawRow`] per
//! data record with values bound to the normalized names by position.

use std::collections::BTreeMap;
use std::io::Read;

use csv::{ByteRecord, ReaderBuilder};
use tracing::{debug, trace};

use super::dialect::Dialect;
use super::headers::{is_canonical, normalize_headers};
use crate::error::{Error, Result};

/// One data record, keyed by normalized field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    line: u64,
    fields: BTreeMap<String, String>,
}

impl RawRow {
    /// Build a row from `(name, value)` pairs. Later pairs win over earlier
    /// ones with the same name.
    pub fn new<I, K, V>(line: u64, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// One-based physical line the record starts on.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Value of `name`, if the file had such a column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Whether every value is empty or whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(|v| v.trim().is_empty())
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }
}

/// Streams [`RawRow`]s out of a delimited source.
///
/// Single pass: once a row has been yielded it can't be read again without
/// starting over from a fresh reader.
pub struct RowReader<R> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    record: ByteRecord,
}

impl<R: Read> RowReader<R> {
    /// Read and normalize the header row of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the header row is missing or can't
    /// be parsed.
    pub fn new(source: R, dialect: &Dialect) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .double_quote(true)
            .from_reader(source);

        let mut header = ByteRecord::new();
        let found = reader
            .read_byte_record(&mut header)
            .map_err(|e| Error::invalid_format(format!("unreadable header row: {e}")))?;
        if !found {
            return Err(Error::invalid_format("missing header row"));
        }

        let raw: Vec<String> = header
            .iter()
            .map(|h| String::from_utf8_lossy(h).into_owned())
            .collect();
        let headers = normalize_headers(&raw);
        trace!(?raw, ?headers, "Normalized header row");

        let rows = Self {
            reader,
            headers,
            record: ByteRecord::new(),
        };
        let unknown: Vec<&str> = rows.unknown_headers().collect();
        if !unknown.is_empty() {
            debug!(?unknown, "Columns outside the logbook vocabulary");
        }
        Ok(rows)
    }

    /// The normalized header row.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Normalized headers that no handler reads. Their values are still
    /// bound, so they take part in classification.
    pub fn unknown_headers(&self) -> impl Iterator<Item = &str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|h| !is_canonical(h))
    }
}

impl<R: Read> Iterator for RowReader<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => return None,
                Err(e) => {
                    return Some(Err(Error::invalid_format(format!(
                        "unreadable row: {e}"
                    ))))
                }
                Ok(true) => {}
            }

            let line = self.record.position().map_or(0, csv::Position::line);
            // Extra values beyond the header row have no name and are dropped;
            // missing trailing values are simply absent.
            let row = RawRow::new(
                line,
                self.headers
                    .iter()
                    .zip(self.record.iter())
                    .map(|(name, value)| (name.clone(), String::from_utf8_lossy(value).into_owned())),
            );

            if row.is_blank() {
                trace!(line, "Skipping blank row");
                continue;
            }
            return Some(Ok(row));
        }
    }
}

impl<R> std::fmt::Debug for RowReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
