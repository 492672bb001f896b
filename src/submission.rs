use serde_json::{Map, Value};

/// A submitted form: field name → value, as sent by the browser.
pub type Submission = Map<String, Value>;

/// Value a browser sends for a ticked checkbox.
pub const CHECKBOX_CHECKED: &str = "on";

/// What a ticked checkbox is stored and exported as.
pub const CHECKBOX_DISPLAY: &str = "Yes";

/// Rewrite checkbox sentinels before a submission is stored.
///
/// Only a string exactly equal to [`CHECKBOX_CHECKED`] changes; every other
/// value passes through untouched.
pub fn normalize_submission(mut submission: Submission) -> Submission {
    for value in submission.values_mut() {
        if value.as_str() == Some(CHECKBOX_CHECKED) {
            *value = Value::String(CHECKBOX_DISPLAY.to_string());
        }
    }
    submission
}

/// Text written into a spreadsheet cell for a submitted value.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(cell_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}
