use super::{ResponseStore, StoredResponse, format_timestamp};
use crate::error::{AppError, Result};
use crate::submission::Submission;
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const HEADER: [&str; 2] = ["submitted_at", "payload"];

fn persist_failure(e: impl std::fmt::Display) -> AppError {
    AppError::ResponsePersistFailure(e.to_string())
}

fn encode_row(fields: [&str; 2]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields).map_err(persist_failure)?;
    writer.into_inner().map_err(persist_failure)
}

/// Create the file with its header unless it already exists. Only the
/// creating writer gets to write the header.
fn ensure_header(path: &Path) -> Result<()> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let header = encode_row(HEADER)?;
            file.write_all(&header).map_err(persist_failure)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(persist_failure(e)),
    }
}

/// Append `bytes` in one write. On failure the file is cut back to its
/// previous length so no partial row is left behind.
fn append_row(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    let len = file.metadata()?.len();
    if let Err(e) = file.write_all(bytes).and_then(|()| file.flush()) {
        if let Err(truncate) = file.set_len(len) {
            log::error!(
                "Could not remove partial row from {}: {}",
                path.display(),
                truncate
            );
        }
        return Err(e);
    }
    Ok(())
}

/// One CSV file per survey under `dir`, one row per submission.
pub struct CsvResponseStore {
    dir: PathBuf,
}

impl CsvResponseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvResponseStore { dir: dir.into() }
    }

    fn file_for(&self, survey_id: &str) -> Result<PathBuf> {
        let safe = !survey_id.is_empty()
            && survey_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(AppError::InvalidInput(format!(
                "Invalid survey id: {}",
                survey_id
            )));
        }
        Ok(self.dir.join(format!("{}.csv", survey_id)))
    }
}

impl ResponseStore for CsvResponseStore {
    fn insert(
        &self,
        survey_id: &str,
        submission: &Submission,
        submitted_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.file_for(survey_id)?;
        let payload = serde_json::to_string(submission).map_err(persist_failure)?;
        let row = encode_row([format_timestamp(submitted_at).as_str(), payload.as_str()])?;

        fs::create_dir_all(&self.dir).map_err(persist_failure)?;
        ensure_header(&path)?;
        append_row(&path, &row).map_err(persist_failure)
    }

    fn list(&self, survey_id: &str) -> Result<Vec<StoredResponse>> {
        let path = self.file_for(survey_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&path)?;

        let mut responses = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    log::warn!(
                        "Skipping unreadable row {} in {}: {}",
                        index + 1,
                        path.display(),
                        e
                    );
                    continue;
                }
            };
            if record.get(0) == Some(HEADER[0]) {
                continue;
            }
            responses.push(StoredResponse {
                id: index as i64 + 1,
                survey_id: survey_id.to_string(),
                created_at: record.get(0).unwrap_or_default().to_string(),
                data: record.get(1).unwrap_or_default().to_string(),
            });
        }

        Ok(responses)
    }

    fn delete_for_survey(&self, survey_id: &str) -> Result<()> {
        let path = self.file_for(survey_id)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_like_survey_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResponseStore::new(dir.path());
        assert!(matches!(
            store.list("../etc/passwd"),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn file_has_header_and_one_row_per_submission() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResponseStore::new(dir.path());
        let mut submission = Submission::new();
        submission.insert("name".to_string(), "Ann".into());

        store.insert("s1", &submission, Utc::now()).unwrap();
        store.insert("s1", &submission, Utc::now()).unwrap();

        let text = fs::read_to_string(dir.path().join("s1.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "submitted_at,payload");
        assert!(lines[1].ends_with(r#","{""name"":""Ann""}""#));
    }

    #[test]
    fn repeated_header_rows_are_not_responses() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResponseStore::new(dir.path());
        fs::write(
            dir.path().join("s1.csv"),
            "submitted_at,payload\nsubmitted_at,payload\n\
             2024-05-01T09:00:00.000000Z,\"{\"\"name\"\":\"\"Ann\"\"}\"\n",
        )
        .unwrap();

        let listed = store.list("s1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].data, r#"{"name":"Ann"}"#);
        assert_eq!(store.count("s1").unwrap(), 1);
    }

    #[test]
    fn file_created_by_another_writer_gets_no_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvResponseStore::new(dir.path());
        fs::write(dir.path().join("s1.csv"), "submitted_at,payload\n").unwrap();
        let mut submission = Submission::new();
        submission.insert("name".to_string(), "Ann".into());

        store.insert("s1", &submission, Utc::now()).unwrap();
        store.insert("s1", &submission, Utc::now()).unwrap();

        let text = fs::read_to_string(dir.path().join("s1.csv")).unwrap();
        assert_eq!(text.matches("submitted_at,payload").count(), 1);
        assert_eq!(store.list("s1").unwrap().len(), 2);
    }
}
