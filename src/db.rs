//! SQLite database: users, survey ownership metadata and (for the sqlite
//! backend) stored responses.
//!
//! Every operation opens its own connection, so handlers never share a
//! connection across requests.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    username      TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS surveys (
    id         TEXT PRIMARY KEY,
    owner      TEXT NOT NULL,
    filename   TEXT NOT NULL,
    extension  TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_surveys_owner ON surveys (owner);

CREATE TABLE IF NOT EXISTS responses (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    survey_id  TEXT NOT NULL,
    data       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_survey ON responses (survey_id);
";

/// Ownership metadata for one uploaded survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyRecord {
    pub id: String,
    pub owner: String,
    /// File name as uploaded by the owner
    pub filename: String,
    /// Extension of the stored template file
    pub extension: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database {
            path: path.as_ref().to_path_buf(),
        };
        db.connect()?.execute_batch(SCHEMA)?;
        Ok(db)
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn register_survey(&self, survey: &SurveyRecord) -> Result<()> {
        self.connect()?.execute(
            "INSERT INTO surveys (id, owner, filename, extension, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                survey.id,
                survey.owner,
                survey.filename,
                survey.extension,
                survey.created_at
            ],
        )?;
        Ok(())
    }

    pub fn find_survey(&self, survey_id: &str) -> Result<Option<SurveyRecord>> {
        let survey = self
            .connect()?
            .query_row(
                "SELECT id, owner, filename, extension, created_at FROM surveys WHERE id = ?1",
                params![survey_id],
                survey_from_row,
            )
            .optional()?;
        Ok(survey)
    }

    /// The survey, but only when `owner` owns it.
    pub fn owned_survey(&self, survey_id: &str, owner: &str) -> Result<Option<SurveyRecord>> {
        Ok(self
            .find_survey(survey_id)?
            .filter(|survey| survey.owner == owner))
    }

    /// Surveys of one user, newest first.
    pub fn surveys_for_owner(&self, owner: &str) -> Result<Vec<SurveyRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, owner, filename, extension, created_at FROM surveys
             WHERE owner = ?1 ORDER BY created_at DESC, id",
        )?;
        let surveys = stmt
            .query_map(params![owner], survey_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(surveys)
    }

    pub fn delete_survey(&self, survey_id: &str) -> Result<()> {
        self.connect()?
            .execute("DELETE FROM surveys WHERE id = ?1", params![survey_id])?;
        Ok(())
    }
}

fn survey_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SurveyRecord> {
    Ok(SurveyRecord {
        id: row.get(0)?,
        owner: row.get(1)?,
        filename: row.get(2)?,
        extension: row.get(3)?,
        created_at: row.get(4)?,
    })
}
