/*!
# Survey Collection Service

A web application that turns an uploaded spreadsheet into a survey form,
collects responses and exports them back to a spreadsheet.

## Overview

An administrator uploads a `.csv`, `.xlsx` or `.xls` template describing the
questions. Every visit to the survey link re-reads the template and renders a
form from it; each submission is normalized and stored. Downloading the
results merges the stored responses back into the template's column layout.

## Template layouts

- **Header**: row 1 holds the questions. Field types follow from the question
  text (anything mentioning a date becomes a date picker, a fixed list of
  names becomes dropdowns or checkboxes).
- **Structured**: row 1 holds the questions, row 2 one of `text`, `date`,
  `checkbox`, `select` per column, and the cells below a `select` column list
  its choices.

## Export

The export keeps the template header and any genuine data rows already in the
template, drops the type row and dropdown-choice rows, then appends one row
per stored response with the submission time in a trailing column.

## Modules

- **schema**: field inference from a template grid
- **reconcile**: merging stored responses into the template layout
- **submission**: normalization of submitted values
- **loader**: reading csv/xlsx/xls files into grids
- **downloader**: export to XLSX and CSV
- **storage**: response persistence (SQLite or CSV files)
- **templates**: uploaded template files
- **db**: SQLite database for users, survey ownership and responses
- **login**: accounts, sessions and the authentication middleware
- **mailer**: survey invitations over SMTP
- **app**: routing and handlers

## REST API Endpoints

- `POST /upload` - Upload a template, returns the survey id and link
- `GET /survey/{id}` - The survey form
- `POST /submit/{id}` - Store a JSON submission
- `GET /download/{id}` - Export responses (`?format=csv` for CSV)
- `POST /share_email` - Email a survey link
*/

pub mod config;
pub mod db;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod reconcile;
pub mod schema;
pub mod storage;
pub mod submission;
pub mod templates;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod login;
#[cfg(feature = "web")]
pub mod mailer;
#[cfg(feature = "web")]
pub mod render;

/// Re-export the commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use loader::Grid;
pub use reconcile::reconcile;
pub use schema::{FieldDescriptor, FieldType, field_name, infer_fields};
pub use submission::{Submission, normalize_submission};
