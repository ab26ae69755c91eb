//! Config command handlers

use anyhow::Result;

use docstore_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(config: &Config, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!("  archive_on_soft_delete: {}", config.archive_on_soft_delete);
            println!("  unarchive_max_attempts: {}", config.unarchive_max_attempts);
            println!("  retry_initial_delay_ms: {}", config.retry_initial_delay_ms);
            println!("  parallel_archive_jobs:  {}", config.parallel_archive_jobs);
            println!("  archive_queue_capacity: {}", config.archive_queue_capacity);
            println!();
            println!("Hot store:    {}", config.sqlite_path().display());
            println!("Archive dir:  {}", config.archive_dir().display());
        }
    }

    Ok(())
}

/// Print the path of the config file that would be read
pub fn path(output: &Output) -> Result<()> {
    let path = Config::config_file_path();
    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "config_file": path }));
        }
        OutputFormat::Human | OutputFormat::Quiet => {
            println!("{}", path.display());
        }
    }
    Ok(())
}
