//! Merge stored responses into the layout of the original template.
//!
//! The template that drives a survey carries three kinds of rows below its
//! header: the type-codeword row (row 1), dropdown option listings, and
//! possibly genuine data rows left over from an earlier export. On export the
//! header and the genuine rows are kept, codeword and option rows are dropped,
//! and every stored response is appended as a row aligned to the header.
//!
//! A row counts as genuine when it has a value in at least one *anchor*
//! column: a column that is not a `select` column, or one that lies beyond the
//! declared header (such as a trailing submission-time column). Option rows
//! only populate `select` columns, so they are empty across all anchors.
//!
//! Header-layout templates have neither a codeword row nor option rows, so
//! every row below the header is prior data and every column is an anchor.

use crate::loader::{Grid, is_blank};
use crate::schema::{Layout, field_name};
use crate::storage::StoredResponse;
use crate::submission::{Submission, cell_text};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Format of the trailing submission-time cell.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SELECT_CODEWORD: &str = "select";

/// Header name → column position, with a normalized-name fallback.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    exact: HashMap<String, usize>,
    normalized: HashMap<String, usize>,
    width: usize,
}

impl ColumnIndex {
    /// Build the index from a header row. Blank header cells are skipped;
    /// when two headers collide the later column wins.
    pub fn from_header(header: &[String]) -> Self {
        let mut index = ColumnIndex {
            width: declared_width(header),
            ..ColumnIndex::default()
        };
        for (col, name) in header.iter().enumerate() {
            if is_blank(name) {
                continue;
            }
            index.exact.insert(name.clone(), col);
            index.normalized.insert(field_name(name), col);
        }
        index
    }

    /// Number of declared columns: up to the last non-blank header cell.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Column for a submitted key: exact header match first, then a match on
    /// the normalized name.
    pub fn lookup(&self, key: &str) -> Option<usize> {
        self.exact
            .get(key)
            .or_else(|| self.normalized.get(&field_name(key)))
            .copied()
    }
}

fn declared_width(header: &[String]) -> usize {
    header
        .iter()
        .rposition(|c| !is_blank(c))
        .map_or(0, |last| last + 1)
}

/// Place a submission into a row of `index.width()` cells.
///
/// Keys that match no column are dropped.
pub fn place_submission(index: &ColumnIndex, submission: &Submission) -> Vec<String> {
    let mut row = vec![String::new(); index.width()];
    for (key, value) in submission {
        if let Some(col) = index.lookup(key) {
            row[col] = cell_text(value);
        }
    }
    row
}

/// Which columns decide whether a template row is genuine data.
pub fn anchor_columns(template: &Grid, layout: Layout) -> Vec<usize> {
    let width = template.iter().map(Vec::len).max().unwrap_or(0);
    if layout == Layout::Header {
        return (0..width).collect();
    }

    let declared = template.first().map_or(0, |h| declared_width(h));
    let types_row: &[String] = template.get(1).map(Vec::as_slice).unwrap_or(&[]);

    (0..width)
        .filter(|&col| {
            let within_types = col < types_row.len()
                && !types_row[col].trim().eq_ignore_ascii_case(SELECT_CODEWORD);
            within_types || col >= declared
        })
        .collect()
}

/// Template rows worth keeping: the header followed by every data row that
/// holds a value in an anchor column. Data starts at row 2 in the
/// self-describing layout and right below the header otherwise.
///
/// Without any anchor column, rows with at least two non-blank cells are kept.
///
/// A respondent row that left every anchor column blank cannot be told apart
/// from an option listing and is dropped with them.
pub fn kept_template_rows(template: &Grid, layout: Layout) -> Grid {
    let Some(header) = template.first() else {
        return Grid::new();
    };

    let anchors = anchor_columns(template, layout);
    let first_data_row = match layout {
        Layout::Header => 1,
        Layout::SelfDescribing => 2,
    };
    let mut kept = vec![header.clone()];

    for row in template.iter().skip(first_data_row) {
        let genuine = if anchors.is_empty() {
            row.iter().filter(|c| !is_blank(c)).count() >= 2
        } else {
            anchors
                .iter()
                .any(|&col| row.get(col).is_some_and(|c| !is_blank(c)))
        };
        if genuine {
            kept.push(row.clone());
        }
    }

    kept
}

/// Display text of a stored UTC timestamp shifted by `offset`.
///
/// Unparseable timestamps are returned unchanged.
pub fn display_timestamp(created_at: &str, offset: Duration) -> String {
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(at) => (at.with_timezone(&Utc) + offset)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        Err(_) => created_at.to_string(),
    }
}

/// Build the export grid for one survey.
///
/// Responses whose payload is not a JSON object are skipped and logged; the
/// remaining ones are still exported.
pub fn reconcile(
    template: &Grid,
    layout: Layout,
    responses: &[StoredResponse],
    offset: Duration,
) -> Grid {
    let mut export = kept_template_rows(template, layout);
    let index = ColumnIndex::from_header(template.first().map(Vec::as_slice).unwrap_or(&[]));

    for response in responses {
        let submission: Submission = match serde_json::from_str(&response.data) {
            Ok(submission) => submission,
            Err(e) => {
                log::warn!(
                    "Skipping corrupt response {} of survey {}: {}",
                    response.id,
                    response.survey_id,
                    e
                );
                continue;
            }
        };

        let mut row = place_submission(&index, &submission);
        row.push(display_timestamp(&response.created_at, offset));
        export.push(row);
    }

    export
}
