//! `top-commodities` and `top-partners`.

use anyhow::Result;
use clap::Args;
use comtrade_lib::{
    leaderboard, validation, CachedClient, CodeBook, ComtradeConfig, TradeQuery, WORLD_CODE,
};

use super::{echo_url, log_summary, FetchFlags, QueryArgs};
use crate::output::{print_ranked, Leaderboard, OutputFormat};

#[derive(Args)]
pub struct TopCommoditiesArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Commodity level to rank: AG2, AG4, AG6 or explicit HS codes
    #[arg(long, default_value = "AG2")]
    pub cmd: String,

    /// Commodities kept per reporter, year and flow
    #[arg(long, default_value = "5")]
    pub top: i64,

    /// Also break each commodity down by its best N partners
    #[arg(long)]
    pub top_partners: Option<i64>,

    #[command(flatten)]
    pub flags: FetchFlags,
}

#[derive(Args)]
pub struct TopPartnersArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Commodity codes to total over
    #[arg(long, default_value = "TOTAL")]
    pub cmd: String,

    /// Partners kept per reporter, year and flow
    #[arg(long, default_value = "10")]
    pub top: i64,

    /// Also break each partner down by its best N commodities
    #[arg(long)]
    pub top_commodities: Option<i64>,

    #[command(flatten)]
    pub flags: FetchFlags,
}

/// Customs procedure and transport mode default to their totals (`C00`,
/// `0`) so detail rows are not summed on top of them.
fn totals_only(mut query: TradeQuery) -> TradeQuery {
    if query.customs_code.is_none() {
        query = query.with_customs_code("C00");
    }
    if query.mot_code.is_none() {
        query = query.with_mot_code("0");
    }
    query
}

pub async fn run_top_commodities(
    args: &TopCommoditiesArgs,
    client: &CachedClient,
    config: &ComtradeConfig,
    format: &OutputFormat,
) -> Result<()> {
    let top = validation::validate_top_n(args.top)?;
    let top_partners = args.top_partners.map(validation::validate_top_n).transpose()?;

    let book = CodeBook::load(&config.support_dir)?;
    let mut query = totals_only(args.query.build_query(&args.cmd, &book)?);
    let mut options = args.flags.options()?;
    if top_partners.is_some() {
        options = options.with_remove_world(true);
    } else if query.partner_unconstrained() {
        // Commodity totals come from the world rows only
        query.partner_codes = vec![WORLD_CODE.to_string()];
    }

    if args.query.echo_url {
        echo_url(client, &query)?;
    }
    let rows = client.get_final_data(&query, &options).await?;
    let ranked = leaderboard::top_commodities(&rows, top, top_partners)?;
    tracing::info!("{} of {} rows in the leaderboard", ranked.len(), rows.len());

    print_ranked(&ranked, Leaderboard::Commodities, format)?;
    log_summary(client);
    Ok(())
}

pub async fn run_top_partners(
    args: &TopPartnersArgs,
    client: &CachedClient,
    config: &ComtradeConfig,
    format: &OutputFormat,
) -> Result<()> {
    let top = validation::validate_top_n(args.top)?;
    let top_commodities = args
        .top_commodities
        .map(validation::validate_top_n)
        .transpose()?;

    let book = CodeBook::load(&config.support_dir)?;
    let query = totals_only(args.query.build_query(&args.cmd, &book)?);
    let options = args.flags.options()?.with_remove_world(true);

    if args.query.echo_url {
        echo_url(client, &query)?;
    }
    let rows = client.get_final_data(&query, &options).await?;
    let ranked = leaderboard::top_partners(&rows, top, top_commodities)?;
    tracing::info!("{} of {} rows in the leaderboard", ranked.len(), rows.len());

    print_ranked(&ranked, Leaderboard::Partners, format)?;
    log_summary(client);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_args() -> QueryArgs {
        QueryArgs {
            reporter: "508".into(),
            partner: None,
            partner2: None,
            period: Some("2021".into()),
            years: None,
            flow: "X".into(),
            customs: None,
            mot: None,
            type_code: "C".into(),
            freq: "A".into(),
            classification: "HS".into(),
            echo_url: false,
        }
    }

    #[test]
    fn open_customs_and_transport_pinned_to_totals() {
        let query = totals_only(query_args().build_query("AG2", &CodeBook::default()).unwrap());
        assert_eq!(query.customs_code.as_deref(), Some("C00"));
        assert_eq!(query.mot_code.as_deref(), Some("0"));

        let pairs = query.to_query_pairs();
        assert!(pairs.contains(&("customsCode".to_string(), "C00".to_string())));
        assert!(pairs.contains(&("motCode".to_string(), "0".to_string())));
    }

    #[test]
    fn explicit_customs_and_transport_kept() {
        let mut args = query_args();
        args.customs = Some("C01".into());
        args.mot = Some("1000".into());
        let query = totals_only(args.build_query("TOTAL", &CodeBook::default()).unwrap());
        assert_eq!(query.customs_code.as_deref(), Some("C01"));
        assert_eq!(query.mot_code.as_deref(), Some("1000"));
    }
}
