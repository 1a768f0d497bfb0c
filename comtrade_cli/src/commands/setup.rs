use std::path::Path;

use anyhow::Result;
use comtrade_lib::comtrade_api::key_prefix;
use comtrade_lib::config::{self, SetupReport};
use comtrade_lib::ComtradeConfig;

pub fn run(config: &ComtradeConfig, config_path: &Path) -> Result<()> {
    let report = config::setup(config, config_path)?;
    print_report(&report, config);

    match config.api_key.as_deref() {
        Some(key) => tracing::info!("Using API key {}...", key_prefix(key)),
        None => tracing::warn!(
            "No API key configured; requests go to the preview endpoint (500 rows max). Set COMTRADE_API_KEY or edit {}",
            config_path.display()
        ),
    }
    Ok(())
}

fn print_report(report: &SetupReport, config: &ComtradeConfig) {
    if report.created_dirs.is_empty() && report.config_written.is_none() {
        println!("Nothing to do; everything is in place.");
    }
    for dir in &report.created_dirs {
        println!("Created directory {}", dir.display());
    }
    if let Some(ref path) = report.config_written {
        println!("Wrote config template {}", path.display());
    }
    println!("Cache directory:   {}", config.cache_dir.display());
    println!("Support directory: {}", config.support_dir.display());
}
