use crate::error::{AppError, Result};
use std::path::Path;

/// A parsed tabular file: rows of text cells, first dimension = rows.
///
/// Rows may be ragged; a missing cell reads as empty.
pub type Grid = Vec<Vec<String>>;

/// Extensions accepted for survey templates.
pub const TEMPLATE_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// Cell text at `(row, col)`, or `""` when out of bounds.
pub fn cell(grid: &Grid, row: usize, col: usize) -> &str {
    grid.get(row)
        .and_then(|r| r.get(col))
        .map(String::as_str)
        .unwrap_or("")
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Lowercased extension of `path`, if it is one we can read.
pub fn template_extension(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| TEMPLATE_EXTENSIONS.contains(&ext.as_str()))
}

/// Load a CSV file into a grid
///
/// No header handling: row 0 of the file is row 0 of the grid. Rows of
/// different lengths are accepted as-is.
///
/// # Examples
/// ```no_run
/// use survey::loader::from_csv;
///
/// match from_csv("template.csv") {
///     Ok(grid) => println!("Loaded {} rows", grid.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(filepath.as_ref())
        .map_err(|e| AppError::TemplateUnreadable(e.to_string()))?;

    let mut grid = Grid::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::TemplateUnreadable(e.to_string()))?;
        grid.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(grid)
}

/// Load the first worksheet of an Excel workbook (xlsx or xls)
///
/// Numbers that hold whole values are written without a fractional part so
/// that `2024` does not turn into `2024.0`; dates become `YYYY-MM-DD`.
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<Grid> {
    use calamine::{Reader, open_workbook_auto};

    let mut workbook = open_workbook_auto(filepath.as_ref())
        .map_err(|e| AppError::TemplateUnreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::TemplateUnreadable("No sheets found in workbook".to_string()))?
        .map_err(|e| AppError::TemplateUnreadable(e.to_string()))?;

    let grid = range
        .rows()
        .map(|row| row.iter().map(excel_cell_text).collect())
        .collect();

    Ok(grid)
}

fn excel_cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;

    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) if value.time() == chrono::NaiveTime::MIN => {
                value.format("%Y-%m-%d").to_string()
            }
            Some(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
        #[allow(unreachable_patterns)]
        other => other.to_string(),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Detect file type and load the appropriate format
///
/// Anything that is not a readable csv/xlsx/xls file is reported as
/// [`AppError::TemplateUnreadable`].
///
/// # Examples
/// ```no_run
/// use survey::loader::load_grid;
///
/// match load_grid("uploads/3f0c.xlsx") {
///     Ok(grid) => println!("{} rows", grid.len()),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_grid(filepath: impl AsRef<Path>) -> Result<Grid> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path),
        Some("xlsx") | Some("xls") => from_excel(path),
        Some(ext) => Err(AppError::TemplateUnreadable(format!(
            "Unsupported file extension: {}",
            ext
        ))),
        None => Err(AppError::TemplateUnreadable(
            "File has no extension".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_rows_are_read_verbatim_and_ragged() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Name,Department").unwrap();
        writeln!(file, "text,select").unwrap();
        writeln!(file, ",Eng").unwrap();
        writeln!(file, "\"Smith, Ann\"").unwrap();

        let grid = load_grid(file.path()).unwrap();
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[0], vec!["Name", "Department"]);
        assert_eq!(grid[2], vec!["", "Eng"]);
        assert_eq!(grid[3], vec!["Smith, Ann"]);
        assert_eq!(cell(&grid, 3, 1), "");
    }

    #[test]
    fn unsupported_extension_is_unreadable() {
        let file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(matches!(
            load_grid(file.path()),
            Err(AppError::TemplateUnreadable(_))
        ));
    }

    #[test]
    fn corrupt_workbook_is_unreadable() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(b"definitely not a zip archive").unwrap();
        assert!(matches!(
            load_grid(file.path()),
            Err(AppError::TemplateUnreadable(_))
        ));
    }

    #[test]
    fn template_extension_filters_unknown_types() {
        assert_eq!(template_extension("a/b/Survey.XLSX").as_deref(), Some("xlsx"));
        assert_eq!(template_extension("survey.csv").as_deref(), Some("csv"));
        assert_eq!(template_extension("survey.pdf"), None);
        assert_eq!(template_extension("survey"), None);
    }

    #[test]
    fn whole_floats_lose_their_fraction() {
        assert_eq!(format_number(2024.0), "2024");
        assert_eq!(format_number(3.5), "3.5");
    }
}
