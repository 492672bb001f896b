#![cfg(not(tarpaulin_include))]

use clap::Parser;
use env_logger::Env;
use survey::{Config, app};

/// Main entry point for the survey web server
///
/// Reads the configuration from the command line and `SURVEY_*` environment
/// variables, then serves until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::info!(
        "Starting survey server on {} with data in {}",
        config.bind,
        config.data_dir.display()
    );

    app::run(config).await
}
