#![cfg(not(tarpaulin_include))]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use survey::config::{LayoutMode, StorageBackend};
use survey::db::Database;
use survey::downloader::{self, ExportFormat};
use survey::storage::{CsvResponseStore, ResponseStore, SqliteResponseStore};
use survey::templates::{TemplateStore, canonical_survey_id};
use survey::{loader, reconcile, schema};

/// Offline tools for survey templates and stored responses.
#[derive(Parser)]
#[command(name = "survey-cli")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the form fields inferred from a template file
    Fields {
        template: PathBuf,
        #[arg(long, value_enum, default_value = "auto")]
        layout: LayoutMode,
    },
    /// Write the reconciled export of a survey from a server data directory
    Export {
        survey_id: String,
        /// Output file; .csv writes CSV, anything else XLSX
        output: PathBuf,
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, value_enum, default_value = "sqlite")]
        storage: StorageBackend,
        #[arg(long, value_enum, default_value = "auto")]
        layout: LayoutMode,
        /// Minutes added to stored UTC timestamps
        #[arg(long, default_value_t = 330, allow_negative_numbers = true)]
        offset_minutes: i64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Fields { template, layout } => {
            let grid = loader::load_grid(&template)?;
            let fields = schema::infer_fields(layout, &grid);
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Command::Export {
            survey_id,
            output,
            data_dir,
            storage,
            layout,
            offset_minutes,
        } => {
            let store: Box<dyn ResponseStore> = match storage {
                StorageBackend::Sqlite => Box::new(SqliteResponseStore::new(Database::open(
                    data_dir.join("survey.sqlite"),
                )?)),
                StorageBackend::Csv => Box::new(CsvResponseStore::new(data_dir.join("responses"))),
            };

            let survey_id = canonical_survey_id(&survey_id)?;
            let template_path = TemplateStore::new(data_dir.join("uploads"))
                .locate(&survey_id)?
                .ok_or_else(|| survey::AppError::TemplateMissing(survey_id.clone()))?;
            let template = loader::load_grid(template_path)?;
            let responses = store.list(&survey_id)?;
            let grid = reconcile::reconcile(
                &template,
                schema::resolve_layout(layout, &template),
                &responses,
                chrono::Duration::minutes(offset_minutes),
            );

            let format = match loader::template_extension(&output).as_deref() {
                Some("csv") => ExportFormat::Csv,
                _ => ExportFormat::Xlsx,
            };
            std::fs::write(&output, downloader::render_export(&grid, format)?)?;
            println!(
                "Wrote {} row(s) from {} stored response(s) to {}",
                grid.len(),
                responses.len(),
                output.display()
            );
        }
    }

    Ok(())
}
