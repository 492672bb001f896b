//! Process configuration.
//!
//! Everything the server needs to know about its surroundings is collected
//! into [`Config`] once at start-up, then shared read-only through the
//! application state.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which response storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Responses live in the `responses` table of the SQLite database
    Sqlite,
    /// Responses are appended to one CSV file per survey
    Csv,
}

/// How uploaded templates are turned into form fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutMode {
    /// Pick the layout from the shape of the template
    Auto,
    /// Row 0 holds labels, types come from a fixed rule table
    Header,
    /// Row 0 holds labels, row 1 type codewords, rows 2+ select options
    Structured,
}

/// Server configuration, read from the command line and `SURVEY_*` variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "survey-server", about = "Spreadsheet-driven survey collection")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "SURVEY_BIND", default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Root directory for uploads, exports, CSV responses and the database
    #[arg(long, env = "SURVEY_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory served under /static
    #[arg(long, env = "SURVEY_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Base URL used when building share links, e.g. https://forms.example.com
    #[arg(long, env = "SURVEY_PUBLIC_URL")]
    pub public_url: Option<String>,

    #[arg(long, env = "SURVEY_STORAGE", value_enum, default_value = "sqlite")]
    pub storage: StorageBackend,

    #[arg(long, env = "SURVEY_LAYOUT", value_enum, default_value = "auto")]
    pub layout: LayoutMode,

    /// Minutes added to stored UTC timestamps when they are exported
    #[arg(long, env = "SURVEY_DISPLAY_OFFSET_MINUTES", default_value_t = 330, allow_negative_numbers = true)]
    pub display_offset_minutes: i64,

    /// Lifetime of a login session
    #[arg(long, env = "SURVEY_SESSION_HOURS", default_value_t = 24)]
    pub session_hours: u64,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "SURVEY_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    #[command(flatten)]
    pub mail: MailConfig,
}

/// SMTP settings for share emails. Sharing is disabled when no host is set.
#[derive(Debug, Clone, clap::Args)]
pub struct MailConfig {
    #[arg(long = "smtp-host", env = "SURVEY_SMTP_HOST")]
    pub host: Option<String>,

    #[arg(long = "smtp-port", env = "SURVEY_SMTP_PORT", default_value_t = 465)]
    pub port: u16,

    #[arg(long = "smtp-user", env = "SURVEY_SMTP_USER")]
    pub username: Option<String>,

    #[arg(long = "smtp-password", env = "SURVEY_SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Sender mailbox, e.g. "Surveys <surveys@example.com>"
    #[arg(long = "mail-from", env = "SURVEY_MAIL_FROM")]
    pub from: Option<String>,
}

impl Config {
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn responses_dir(&self) -> PathBuf {
        self.data_dir.join("responses")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("survey.sqlite")
    }

    /// Create the directories the server writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.upload_dir())?;
        std::fs::create_dir_all(self.export_dir())?;
        if self.storage == StorageBackend::Csv {
            std::fs::create_dir_all(self.responses_dir())?;
        }
        Ok(())
    }

    /// Public link for a survey. Falls back to the request host when no
    /// public URL is configured.
    pub fn survey_url(&self, request_host: Option<&str>, survey_id: &str) -> String {
        let base = match (&self.public_url, request_host) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("http://{}", host),
            (None, None) => format!("http://{}", self.bind),
        };
        format!("{}/survey/{}", base, survey_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_derived_paths() {
        let config = Config::try_parse_from(["survey-server", "--data-dir", "/srv/forms"]).unwrap();
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.layout, LayoutMode::Auto);
        assert_eq!(config.display_offset_minutes, 330);
        assert_eq!(config.upload_dir(), PathBuf::from("/srv/forms/uploads"));
        assert_eq!(config.database_path(), PathBuf::from("/srv/forms/survey.sqlite"));
        assert!(config.mail.host.is_none());
    }

    #[test]
    fn survey_url_prefers_public_url() {
        let mut config = Config::try_parse_from(["survey-server"]).unwrap();
        assert_eq!(
            config.survey_url(Some("localhost:3000"), "abc"),
            "http://localhost:3000/survey/abc"
        );
        config.public_url = Some("https://forms.example.com/".to_string());
        assert_eq!(
            config.survey_url(Some("localhost:3000"), "abc"),
            "https://forms.example.com/survey/abc"
        );
    }
}
