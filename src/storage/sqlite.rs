use super::{ResponseStore, StoredResponse, format_timestamp};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::submission::Submission;
use chrono::{DateTime, Utc};
use rusqlite::params;

pub struct SqliteResponseStore {
    db: Database,
}

impl SqliteResponseStore {
    pub fn new(db: Database) -> Self {
        SqliteResponseStore { db }
    }
}

fn persist_failure(e: impl std::fmt::Display) -> AppError {
    AppError::ResponsePersistFailure(e.to_string())
}

impl ResponseStore for SqliteResponseStore {
    fn insert(
        &self,
        survey_id: &str,
        submission: &Submission,
        submitted_at: DateTime<Utc>,
    ) -> Result<()> {
        let data = serde_json::to_string(submission).map_err(persist_failure)?;

        let mut conn = self.db.connect().map_err(persist_failure)?;
        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction().map_err(persist_failure)?;
        tx.execute(
            "INSERT INTO responses (survey_id, data, created_at) VALUES (?1, ?2, ?3)",
            params![survey_id, data, format_timestamp(submitted_at)],
        )
        .map_err(persist_failure)?;
        tx.commit().map_err(persist_failure)?;

        Ok(())
    }

    fn list(&self, survey_id: &str) -> Result<Vec<StoredResponse>> {
        let conn = self.db.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, survey_id, data, created_at FROM responses
             WHERE survey_id = ?1 ORDER BY created_at, id",
        )?;
        let responses = stmt
            .query_map(params![survey_id], |row| {
                Ok(StoredResponse {
                    id: row.get(0)?,
                    survey_id: row.get(1)?,
                    data: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(responses)
    }

    fn count(&self, survey_id: &str) -> Result<usize> {
        let count: i64 = self.db.connect()?.query_row(
            "SELECT COUNT(*) FROM responses WHERE survey_id = ?1",
            params![survey_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_for_survey(&self, survey_id: &str) -> Result<()> {
        self.db
            .connect()?
            .execute("DELETE FROM responses WHERE survey_id = ?1", params![survey_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(name: &str) -> Submission {
        let mut submission = Submission::new();
        submission.insert("name".to_string(), name.into());
        submission
    }

    #[test]
    fn failed_insert_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.sqlite")).unwrap();
        let store = SqliteResponseStore::new(db.clone());
        store.insert("s1", &submission("Ann"), Utc::now()).unwrap();

        db.connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_responses BEFORE INSERT ON responses
                 BEGIN SELECT RAISE(ABORT, 'responses are read-only'); END;",
            )
            .unwrap();

        let err = store.insert("s1", &submission("Bob"), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::ResponsePersistFailure(_)));

        let listed = store.list("s1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].data, r#"{"name":"Ann"}"#);
    }

    #[test]
    fn count_matches_list() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.sqlite")).unwrap();
        let store = SqliteResponseStore::new(db);
        for name in ["Ann", "Bob", "Cy"] {
            store.insert("s1", &submission(name), Utc::now()).unwrap();
        }
        assert_eq!(store.count("s1").unwrap(), store.list("s1").unwrap().len());
        assert_eq!(store.count("s2").unwrap(), 0);
    }
}
