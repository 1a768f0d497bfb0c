use anyhow::Result;
use clap::Args;
use comtrade_lib::{ComtradeConfig, DiskCache};

use crate::output::{print_cache_entries, OutputFormat};

#[derive(Args)]
pub struct CleanCacheArgs {
    /// List cached responses instead of deleting anything
    #[arg(long, conflicts_with = "all")]
    pub list: bool,

    /// Delete every cached response, not only the expired ones
    #[arg(long)]
    pub all: bool,
}

pub fn run(args: &CleanCacheArgs, config: &ComtradeConfig, format: &OutputFormat) -> Result<()> {
    let cache = DiskCache::new(&config.cache_dir, config.cache_validity());

    if args.list {
        let entries = cache.entries()?;
        if entries.is_empty() {
            eprintln!("Cache {} is empty", config.cache_dir.display());
            return Ok(());
        }
        return print_cache_entries(&entries, format);
    }

    let removed = if args.all { cache.clear()? } else { cache.sweep()? };
    println!(
        "Removed {} cached response{} from {}",
        removed,
        if removed == 1 { "" } else { "s" },
        config.cache_dir.display()
    );
    Ok(())
}
