//! Response storage.
//!
//! Responses are kept either in SQLite or, as the first iterations of the
//! service did, in one CSV file per survey. Both backends store the same
//! thing: the submission serialized as a JSON object plus a UTC timestamp.

use crate::config::{Config, StorageBackend};
use crate::db::Database;
use crate::error::Result;
use crate::submission::{Submission, normalize_submission};
use chrono::{DateTime, SecondsFormat, Utc};

mod csv_file;
mod sqlite;

pub use csv_file::CsvResponseStore;
pub use sqlite::SqliteResponseStore;

/// One stored submission, as read back from storage.
///
/// `data` is kept serialized so that a corrupt record can be skipped by the
/// reader instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub id: i64,
    pub survey_id: String,
    pub data: String,
    /// RFC 3339, UTC
    pub created_at: String,
}

pub trait ResponseStore: Send + Sync {
    /// Append one submission. Either the whole record is stored or nothing is.
    fn insert(&self, survey_id: &str, submission: &Submission, submitted_at: DateTime<Utc>)
    -> Result<()>;

    /// All responses of a survey, oldest first.
    fn list(&self, survey_id: &str) -> Result<Vec<StoredResponse>>;

    fn count(&self, survey_id: &str) -> Result<usize> {
        Ok(self.list(survey_id)?.len())
    }

    fn delete_for_survey(&self, survey_id: &str) -> Result<()>;
}

/// Build the backend selected in the configuration.
pub fn open_store(config: &Config, db: &Database) -> Box<dyn ResponseStore> {
    match config.storage {
        StorageBackend::Sqlite => Box::new(SqliteResponseStore::new(db.clone())),
        StorageBackend::Csv => Box::new(CsvResponseStore::new(config.responses_dir())),
    }
}

/// Normalize a raw submission and store it. Returns what was stored.
pub fn record_submission(
    store: &dyn ResponseStore,
    survey_id: &str,
    raw: Submission,
    submitted_at: DateTime<Utc>,
) -> Result<Submission> {
    let submission = normalize_submission(raw);
    store.insert(survey_id, &submission, submitted_at)?;
    Ok(submission)
}

/// Timestamp format used by every backend. Fixed width, so text order is
/// time order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
