//! Delimiter sniffing.
//!
//! The first few kilobytes of an upload are inspected to decide how its
//! fields are separated. Only commas and tabs are trusted; any other
//! consistent separator found in the sample is taken to be an artifact of the
//! data and the file is read as tab separated.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};

/// Separators considered during inference, most preferred first.
const CANDIDATES: &[u8] = b",\t;|: ";

/// Share of sampled lines that must agree on a separator count.
const MIN_CONSISTENCY: f64 = 0.9;

static SINGLE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[,\t;|: ])'[^'\r\n]*'(?:[,\t;|: ]|\r?$)").expect("quote pattern")
});

static DOUBLE_QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)(?:^|[,\t;|: ])"[^"\r\n]*"(?:[,\t;|: ]|\r?$)"#).expect("quote pattern")
});

/// Delimiter and quoting convention of an uploaded file.
///
/// Inferred once per import and then applied to every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Field separator.
    pub delimiter: u8,
    /// Character that quotes fields containing the separator.
    pub quote: u8,
}

impl Dialect {
    /// Spreadsheet-style tab separated text.
    pub const TAB: Self = Self {
        delimiter: b'\t',
        quote: b'"',
    };

    /// Spreadsheet-style comma separated text.
    pub const COMMA: Self = Self {
        delimiter: b',',
        quote: b'"',
    };

    /// Work out the dialect of `source` from its first `sample_size` bytes.
    ///
    /// With `force_tsv` nothing is inspected and [`Dialect::TAB`] is returned.
    /// The read position of `source` is rewound to the start before and
    /// after sampling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when no consistent separator can be
    /// found, and an I/O error if the source can't be read or rewound.
    pub fn sniff<R: Read + Seek>(
        source: &mut R,
        force_tsv: bool,
        sample_size: usize,
    ) -> Result<Self> {
        source.seek(SeekFrom::Start(0))?;
        if force_tsv {
            debug!("Tab separated input forced, skipping delimiter inference");
            return Ok(Self::TAB);
        }

        let limit = u64::try_from(sample_size).unwrap_or(u64::MAX);
        let mut sample = Vec::with_capacity(sample_size.min(64 * 1024));
        source.by_ref().take(limit).read_to_end(&mut sample)?;
        source.seek(SeekFrom::Start(0))?;

        let truncated = sample.len() >= sample_size;
        let dialect = Self::infer(&String::from_utf8_lossy(&sample), truncated)?;
        debug!(
            delimiter = %char::from(dialect.delimiter).escape_default(),
            quote = %char::from(dialect.quote),
            sampled = sample.len(),
            "Sniffed dialect"
        );
        Ok(dialect)
    }

    /// Infer the dialect of a text sample.
    ///
    /// When `truncated` is set the sample was cut off mid-file and its last
    /// line is left out of the statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] when no consistent separator exists.
    pub fn infer(sample: &str, truncated: bool) -> Result<Self> {
        let quote_byte = guess_quote(sample);
        let quote = char::from(quote_byte);

        let mut lines = split_records(sample, quote);
        if truncated && lines.len() > 1 {
            lines.pop();
        }
        lines.retain(|line| !line.trim().is_empty());
        if lines.is_empty() {
            return Err(Error::invalid_format("file is empty"));
        }

        let mut best: Option<(u8, f64)> = None;
        for &candidate in CANDIDATES {
            let Some(consistency) = consistency(&lines, candidate, quote) else {
                continue;
            };
            if consistency < MIN_CONSISTENCY {
                continue;
            }
            // Candidates are in preference order, so only a strictly better
            // score displaces an earlier one.
            if best.map_or(true, |(_, score)| consistency > score) {
                best = Some((candidate, consistency));
            }
        }

        let Some((delimiter, _)) = best else {
            return Err(Error::invalid_format(
                "could not determine the column delimiter",
            ));
        };

        let delimiter = match delimiter {
            b',' | b'\t' => delimiter,
            other => {
                debug!(
                    sniffed = %char::from(other).escape_default(),
                    "Unsupported delimiter, reading as tab separated"
                );
                b'\t'
            }
        };

        Ok(Self {
            delimiter,
            quote: quote_byte,
        })
    }
}

/// Prefer single quotes only when they clearly delimit fields and double
/// quotes never do.
fn guess_quote(sample: &str) -> u8 {
    if SINGLE_QUOTED.is_match(sample) && !DOUBLE_QUOTED.is_match(sample) {
        b'\''
    } else {
        b'"'
    }
}

/// Split a sample into logical records. Line breaks inside quotes belong to
/// the field, not the record boundary.
fn split_records(sample: &str, quote: char) -> Vec<&str> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let mut chars = sample.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch == quote {
            in_quotes = !in_quotes;
        } else if !in_quotes && (ch == '\n' || ch == '\r') {
            records.push(&sample[start..idx]);
            if ch == '\r' && matches!(chars.peek(), Some((_, '\n'))) {
                chars.next();
            }
            start = chars.peek().map_or(sample.len(), |(next, _)| *next);
        }
    }
    if start < sample.len() {
        records.push(&sample[start..]);
    }
    records
}

/// Number of `delimiter` occurrences outside quotes.
fn count_unquoted(line: &str, delimiter: u8, quote: char) -> usize {
    let delimiter = char::from(delimiter);
    let mut in_quotes = false;
    let mut count = 0;
    for ch in line.chars() {
        if ch == quote {
            in_quotes = !in_quotes;
        } else if ch == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Share of lines whose separator count equals the most common count, or
/// `None` when the separator never appears.
#[allow(clippy::cast_precision_loss)]
fn consistency(lines: &[&str], delimiter: u8, quote: char) -> Option<f64> {
    let mut frequencies: HashMap<usize, usize> = HashMap::new();
    for line in lines {
        *frequencies
            .entry(count_unquoted(line, delimiter, quote))
            .or_default() += 1;
    }

    let (&mode, &agreeing) = frequencies
        .iter()
        .max_by(|(count_a, lines_a), (count_b, lines_b)| {
            lines_a.cmp(lines_b).then(count_a.cmp(count_b))
        })?;
    if mode == 0 {
        return None;
    }
    Some(agreeing as f64 / lines.len() as f64)
}
