use crate::error::{AppError, Result};
use crate::loader::{TEMPLATE_EXTENSIONS, template_extension};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Uploaded survey templates, one file per survey named `<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

/// Survey identifiers are v4 UUIDs; anything else never reaches the filesystem.
pub fn parse_survey_id(survey_id: &str) -> Result<Uuid> {
    Uuid::parse_str(survey_id)
        .map_err(|_| AppError::TemplateNotFound(survey_id.to_string()))
}

/// The lowercase hyphenated form every store keys surveys by. Uppercase,
/// simple and braced spellings of the same UUID map to it.
pub fn canonical_survey_id(survey_id: &str) -> Result<String> {
    parse_survey_id(survey_id).map(|id| id.to_string())
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TemplateStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store an uploaded file under a fresh identifier.
    ///
    /// `original_name` only decides the extension, which must be csv, xlsx
    /// or xls. Returns the new survey identifier and the stored extension.
    pub fn save(&self, original_name: &str, contents: &[u8]) -> Result<(String, String)> {
        if original_name.trim().is_empty() {
            return Err(AppError::UploadRejected("No file selected".to_string()));
        }
        if contents.is_empty() {
            return Err(AppError::UploadRejected("Uploaded file is empty".to_string()));
        }
        let extension = template_extension(original_name).ok_or_else(|| {
            AppError::UploadRejected(format!(
                "Unsupported file type; expected one of: {}",
                TEMPLATE_EXTENSIONS.join(", ")
            ))
        })?;

        let survey_id = Uuid::new_v4().to_string();
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(&survey_id, &extension), contents)?;

        log::info!("Stored template {} as survey {}", original_name, survey_id);
        Ok((survey_id, extension))
    }

    fn path_for(&self, survey_id: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", survey_id, extension))
    }

    /// Path of the stored template, if there is one.
    pub fn locate(&self, survey_id: &str) -> Result<Option<PathBuf>> {
        let id = parse_survey_id(survey_id)?;
        Ok(TEMPLATE_EXTENSIONS
            .iter()
            .map(|ext| self.path_for(&id.to_string(), ext))
            .find(|path| path.is_file()))
    }

    /// Remove the stored template. Missing files are not an error.
    pub fn delete(&self, survey_id: &str) -> Result<()> {
        if let Some(path) = self.locate(survey_id)? {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
