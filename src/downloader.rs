use crate::error::Result;
use crate::loader::Grid;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the worksheet holding exported responses.
pub const EXPORT_SHEET_NAME: &str = "Responses";

/// File format of a response export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    /// Download file name for a survey's export.
    pub fn file_name(self, survey_id: &str) -> String {
        format!("responses_{}.{}", survey_id, self.extension())
    }
}

/// Convert a grid to CSV format
///
/// Rows are written as they are; ragged rows stay ragged.
///
/// # Arguments
/// * `grid` - Rows of cell text
///
/// # Returns
/// * `Result<Vec<u8>>` - CSV content as bytes or an error
pub fn to_csv(grid: &Grid) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in grid {
        writer.write_record(row)?;
    }
    let buffer = writer
        .into_inner()
        .map_err(|e| crate::error::AppError::Export(e.to_string()))?;
    Ok(buffer)
}

/// Convert a grid to XLSX format
///
/// Every cell is written as a string into a single worksheet, so values such
/// as zip codes keep their leading zeros.
///
/// # Arguments
/// * `grid` - Rows of cell text
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
pub fn to_xlsx(grid: &Grid) -> Result<Vec<u8>> {
    use rust_xlsxwriter::Workbook;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(EXPORT_SHEET_NAME)?;

    for (r, row) in grid.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet.write_string(r as u32, c as u16, value)?;
        }
    }

    let buffer = workbook.save_to_buffer()?;
    Ok(buffer)
}

/// Render a grid in the requested format.
pub fn render_export(grid: &Grid, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Xlsx => to_xlsx(grid),
        ExportFormat::Csv => to_csv(grid),
    }
}

/// Keep a copy of the export next to the other exports, replacing any
/// earlier one for the same survey and format.
pub fn store_export(
    dir: &Path,
    survey_id: &str,
    format: ExportFormat,
    contents: &[u8],
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format.file_name(survey_id));
    fs::write(&path, contents)?;
    Ok(path)
}

/// Remove every stored export of a survey.
pub fn delete_exports(dir: &Path, survey_id: &str) -> Result<()> {
    for format in [ExportFormat::Xlsx, ExportFormat::Csv] {
        let path = dir.join(format.file_name(survey_id));
        if path.exists() {
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grid {
        vec![
            vec!["Name".to_string(), "Email".to_string()],
            vec![
                "Smith, Ann".to_string(),
                "a@x.com".to_string(),
                "2024-05-01 09:00:00".to_string(),
            ],
        ]
    }

    #[test]
    fn csv_quotes_and_keeps_ragged_rows() {
        let text = String::from_utf8(to_csv(&sample()).unwrap()).unwrap();
        assert_eq!(
            text,
            "Name,Email\n\"Smith, Ann\",a@x.com,2024-05-01 09:00:00\n"
        );
    }

    #[test]
    fn xlsx_export_reads_back_with_calamine() {
        let bytes = to_xlsx(&sample()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = store_export(dir.path(), "s1", ExportFormat::Xlsx, &bytes).unwrap();
        assert!(path.ends_with("responses_s1.xlsx"));

        let grid = crate::loader::load_grid(&path).unwrap();
        assert_eq!(grid[0][0], "Name");
        assert_eq!(grid[1][0], "Smith, Ann");
        assert_eq!(grid[1][2], "2024-05-01 09:00:00");

        delete_exports(dir.path(), "s1").unwrap();
        assert!(!path.exists());
    }
}
