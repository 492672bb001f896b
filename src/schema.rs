//! Form field inference from uploaded templates.
//!
//! Two template layouts are understood:
//!
//! - **header**: row 0 holds the column labels; field types come from a fixed
//!   rule table matched against the normalized label.
//! - **structured** (self-describing): inside each column the first non-empty
//!   cell is the label, the second is a type codeword and, for `select`
//!   columns, the rest are the dropdown options.

use crate::config::LayoutMode;
use crate::loader::{Grid, cell, is_blank};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref NON_ALNUM_RUN: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

/// Labels rendered as dropdowns in the header layout.
const SELECT_NAMES: [&str; 10] = [
    "gender",
    "department",
    "country",
    "state",
    "city",
    "category",
    "status",
    "rating",
    "priority",
    "level",
];

/// Labels rendered as checkboxes in the header layout.
const CHECKBOX_NAMES: [&str; 6] = [
    "agree",
    "consent",
    "subscribe",
    "newsletter",
    "terms",
    "accept_terms",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Date,
    Checkbox,
    Select,
}

impl FieldType {
    /// Parse a type codeword. Unknown words fall back to `Text`.
    pub fn from_codeword(word: &str) -> Self {
        Self::parse(word).unwrap_or(FieldType::Text)
    }

    fn parse(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "text" => Some(FieldType::Text),
            "date" => Some(FieldType::Date),
            "checkbox" => Some(FieldType::Checkbox),
            "select" => Some(FieldType::Select),
            _ => None,
        }
    }

    pub fn is_codeword(word: &str) -> bool {
        Self::parse(word).is_some()
    }
}

/// One form question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// HTML field key and JSON key of submitted data
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// Dropdown choices; empty unless `kind` is `Select`
    pub options: Vec<String>,
}

impl FieldDescriptor {
    fn new(label: &str, kind: FieldType, options: Vec<String>) -> Self {
        FieldDescriptor {
            name: field_name(label),
            label: label.trim().to_string(),
            kind,
            options,
        }
    }
}

/// Derive a field name from a label.
///
/// Lowercases the label, collapses every run of characters outside
/// `[a-z0-9]` into one underscore and strips underscores at both ends.
///
/// ```
/// use survey::schema::field_name;
///
/// assert_eq!(field_name("E-mail Address"), "e_mail_address");
/// assert_eq!(field_name("  Date of Birth (DOB) "), "date_of_birth_dob");
/// ```
pub fn field_name(label: &str) -> String {
    let lowered = label.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// The layout actually used for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Header,
    SelfDescribing,
}

/// Resolve the configured layout mode against a concrete grid.
///
/// In `Auto` mode the template is self-describing when row 1 has at least one
/// non-empty cell and every non-empty cell of row 1 is a type codeword.
pub fn resolve_layout(mode: LayoutMode, grid: &Grid) -> Layout {
    match mode {
        LayoutMode::Header => Layout::Header,
        LayoutMode::Structured => Layout::SelfDescribing,
        LayoutMode::Auto => {
            let Some(types_row) = grid.get(1) else {
                return Layout::Header;
            };
            let mut cells = types_row.iter().filter(|c| !is_blank(c)).peekable();
            if cells.peek().is_none() {
                return Layout::Header;
            }
            if cells.all(|c| FieldType::is_codeword(c)) {
                Layout::SelfDescribing
            } else {
                Layout::Header
            }
        }
    }
}

/// Infer the form fields of a template.
pub fn infer_fields(mode: LayoutMode, grid: &Grid) -> Vec<FieldDescriptor> {
    match resolve_layout(mode, grid) {
        Layout::Header => header_fields(grid),
        Layout::SelfDescribing => self_describing_fields(grid),
    }
}

fn column_count(grid: &Grid) -> usize {
    grid.iter().map(Vec::len).max().unwrap_or(0)
}

/// Distinct non-empty values, trimmed, in order of first appearance.
fn distinct_values<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() || seen.iter().any(|s| s == value) {
            continue;
        }
        seen.push(value.to_string());
    }
    seen
}

/// Header layout: labels in row 0, types from the rule table.
pub fn header_fields(grid: &Grid) -> Vec<FieldDescriptor> {
    let Some(header) = grid.first() else {
        return Vec::new();
    };

    let mut fields = Vec::new();
    for (col, label) in header.iter().enumerate() {
        if is_blank(label) {
            continue;
        }
        let name = field_name(label);

        let kind = if name.contains("date") || name == "dob" {
            FieldType::Date
        } else if SELECT_NAMES.contains(&name.as_str()) {
            FieldType::Select
        } else if CHECKBOX_NAMES.contains(&name.as_str()) {
            FieldType::Checkbox
        } else {
            FieldType::Text
        };

        let field = match kind {
            FieldType::Select => {
                let options = distinct_values((1..grid.len()).map(|row| cell(grid, row, col)));
                if options.is_empty() {
                    FieldDescriptor::new(label, FieldType::Text, Vec::new())
                } else {
                    FieldDescriptor::new(label, FieldType::Select, options)
                }
            }
            other => FieldDescriptor::new(label, other, Vec::new()),
        };
        fields.push(field);
    }

    fields
}

/// Self-describing layout: label, codeword and options read down each column.
pub fn self_describing_fields(grid: &Grid) -> Vec<FieldDescriptor> {
    let mut fields = Vec::new();

    for col in 0..column_count(grid) {
        let cells: Vec<&str> = (0..grid.len())
            .map(|row| cell(grid, row, col))
            .filter(|c| !is_blank(c))
            .collect();

        if cells.len() < 2 {
            log::warn!(
                "Skipping template column {}: expected a label and a type, found {} non-empty cell(s)",
                col,
                cells.len()
            );
            continue;
        }

        let kind = FieldType::from_codeword(cells[1]);
        let options = if kind == FieldType::Select {
            distinct_values(cells[2..].iter().copied())
        } else {
            Vec::new()
        };

        fields.push(FieldDescriptor::new(cells[0], kind, options));
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn field_name_collapses_punctuation_runs() {
        assert_eq!(field_name("First Name"), "first_name");
        assert_eq!(field_name("e.mail -- address!"), "e_mail_address");
        assert_eq!(field_name("__Already_Fine__"), "already_fine");
        assert_eq!(field_name("Café"), "caf");
        assert_eq!(field_name("   "), "");
    }

    #[test]
    fn field_name_is_idempotent() {
        for label in ["First Name", "E-mail", "Q1. Age?", "ALL CAPS", "a..b  c", "Prénom"] {
            let once = field_name(label);
            assert_eq!(field_name(&once), once, "label {:?}", label);
        }
    }

    #[test]
    fn select_column_options_are_deduplicated_in_order() {
        let g = grid(&[&["Department"], &["select"], &["Eng"], &["Sales"], &["Eng"]]);
        let fields = self_describing_fields(&g);
        assert_eq!(
            fields,
            vec![FieldDescriptor {
                name: "department".to_string(),
                label: "Department".to_string(),
                kind: FieldType::Select,
                options: vec!["Eng".to_string(), "Sales".to_string()],
            }]
        );
    }

    #[test]
    fn columns_with_a_single_cell_are_skipped() {
        let g = grid(&[&["Name", "Orphan", "Joined"], &["text", "", "date"]]);
        let fields = self_describing_fields(&g);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "joined"]);
        assert_eq!(fields[1].kind, FieldType::Date);
    }

    #[test]
    fn empty_cells_are_dropped_before_reading_label_and_type() {
        let g = grid(&[
            &["", "Team"],
            &["Team", ""],
            &["select", "SELECT"],
            &["Red", "Blue"],
            &["", "Blue"],
            &["Red", "Green"],
        ]);
        let fields = self_describing_fields(&g);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].label, "Team");
        assert_eq!(fields[0].options, vec!["Red"]);
        assert_eq!(fields[1].options, vec!["Blue", "Green"]);
    }

    #[test]
    fn unknown_codeword_falls_back_to_text() {
        let g = grid(&[&["Age", "Consent"], &["number", "Checkbox"]]);
        let fields = self_describing_fields(&g);
        assert_eq!(fields[0].kind, FieldType::Text);
        assert_eq!(fields[1].kind, FieldType::Checkbox);
        assert!(fields[0].options.is_empty());
    }

    #[test]
    fn header_layout_uses_rule_table() {
        let g = grid(&[
            &["Full Name", "Start Date", "Gender", "Agree", "Status"],
            &["Ann", "2024-01-01", "F", "", ""],
            &["Bob", "2024-02-01", "M", "", ""],
            &["Cid", "2024-03-01", "F", "", ""],
        ]);
        let fields = header_fields(&g);
        let kinds: Vec<FieldType> = fields.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FieldType::Text,
                FieldType::Date,
                FieldType::Select,
                FieldType::Checkbox,
                FieldType::Text,
            ]
        );
        assert_eq!(fields[2].options, vec!["F", "M"]);
        assert_eq!(fields[1].name, "start_date");
    }

    #[test]
    fn header_layout_skips_blank_labels() {
        let g = grid(&[&["Name", "", "Email"]]);
        let names: Vec<String> = header_fields(&g).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["name", "email"]);
    }

    #[test]
    fn auto_layout_detection() {
        let structured = grid(&[&["Name", "Dept"], &["text", "select"], &["", "Eng"]]);
        let plain = grid(&[&["Name", "Dept"], &["Ann", "Eng"]]);
        let header_only = grid(&[&["Name", "Dept"]]);

        assert_eq!(resolve_layout(LayoutMode::Auto, &structured), Layout::SelfDescribing);
        assert_eq!(resolve_layout(LayoutMode::Auto, &plain), Layout::Header);
        assert_eq!(resolve_layout(LayoutMode::Auto, &header_only), Layout::Header);
        assert_eq!(resolve_layout(LayoutMode::Structured, &plain), Layout::SelfDescribing);
        assert_eq!(resolve_layout(LayoutMode::Header, &structured), Layout::Header);
    }

    #[test]
    fn descriptor_serializes_type_key() {
        let field = FieldDescriptor::new("Name", FieldType::Text, Vec::new());
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["name"], "name");
    }
}
