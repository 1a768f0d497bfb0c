use anyhow::{bail, Result};
use clap::Args;
use comtrade_lib::{assembler, CachedClient, CodeBook, ComtradeConfig, TradeQuery};

use super::{echo_url, log_summary, FetchFlags, QueryArgs};
use crate::output::{print_records, OutputFormat};

#[derive(Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Commodity codes, comma-separated: TOTAL, AG2, AG4, AG6 or HS codes (e.g. 27,2709)
    #[arg(long, default_value = "TOTAL")]
    pub cmd: String,

    /// Drop rows whose partner is the world aggregate
    #[arg(long)]
    pub remove_world: bool,

    /// Fill missing descriptions from the code book in the support directory
    #[arg(long)]
    pub decode: bool,

    /// Extra query parameter passed through to the service, repeatable
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    #[command(flatten)]
    pub flags: FetchFlags,
}

pub async fn run(
    args: &FetchArgs,
    client: &CachedClient,
    config: &ComtradeConfig,
    format: &OutputFormat,
) -> Result<()> {
    let book = CodeBook::load(&config.support_dir)?;
    let mut query = args.query.build_query(&args.cmd, &book)?;
    for param in &args.params {
        query = with_param(query, param)?;
    }
    let options = args.flags.options()?.with_remove_world(args.remove_world);

    if args.query.echo_url {
        echo_url(client, &query)?;
    }

    let mut rows = client.get_final_data(&query, &options).await?;
    if args.decode {
        rows = assembler::decode(rows, &book);
    }
    tracing::info!("{} rows for {} periods", rows.len(), query.periods.len());

    print_records(&rows, format)?;
    log_summary(client);
    Ok(())
}

fn with_param(query: TradeQuery, param: &str) -> Result<TradeQuery> {
    let Some((key, value)) = param.split_once('=') else {
        bail!("invalid parameter '{}'. Expected KEY=VALUE", param);
    };
    let key = key.trim();
    if key.is_empty() || key.eq_ignore_ascii_case("subscription-key") {
        bail!("invalid parameter name '{}'", key);
    }
    Ok(query.with_extra(key, value.trim()))
}
