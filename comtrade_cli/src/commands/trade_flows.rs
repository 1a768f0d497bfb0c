use anyhow::{bail, Result};
use clap::Args;
use comtrade_lib::planner::year_range;
use comtrade_lib::{validation, CachedClient, CodeBook, ComtradeConfig, FreqCode};

use super::{log_summary, parse_year_span, resolve_countries, FetchFlags};
use crate::output::{print_balance, OutputFormat};

#[derive(Args)]
pub struct TradeFlowsArgs {
    /// Reporter country: M49 code or name
    #[arg(long)]
    pub reporter: String,

    /// Years, comma-separated
    #[arg(long, conflicts_with = "years")]
    pub period: Option<String>,

    /// Inclusive year range, e.g. 2015-2022
    #[arg(long)]
    pub years: Option<String>,

    /// Partner countries: codes or names, comma-separated; 0 for the world
    #[arg(long, default_value = "0", conflicts_with = "all_partners")]
    pub partner: String,

    /// Sum over every partner instead of the world aggregate
    #[arg(long)]
    pub all_partners: bool,

    /// Skip the partners' own declarations
    #[arg(long)]
    pub no_mirror: bool,

    #[command(flatten)]
    pub flags: FetchFlags,
}

impl TradeFlowsArgs {
    fn periods(&self) -> Result<Vec<String>> {
        match (&self.period, &self.years) {
            (Some(period), _) => Ok(validation::validate_periods(period, FreqCode::Annual)?),
            (None, Some(years)) => {
                let (start, end) = parse_year_span(years)?;
                Ok(validation::validate_periods(&year_range(start, end), FreqCode::Annual)?)
            }
            (None, None) => bail!("either --period or --years is required"),
        }
    }

    fn partners(&self, book: &CodeBook) -> Result<Option<String>> {
        if self.all_partners {
            return Ok(None);
        }
        Ok(Some(resolve_countries(&self.partner, book)?.join(",")))
    }
}

pub async fn run(
    args: &TradeFlowsArgs,
    client: &CachedClient,
    config: &ComtradeConfig,
    format: &OutputFormat,
) -> Result<()> {
    let book = CodeBook::load(&config.support_dir)?;
    let reporter = resolve_countries(&args.reporter, &book)?.join(",");
    let periods = args.periods()?.join(",");
    let partners = args.partners(&book)?;
    let options = args.flags.options()?;

    let rows = client
        .get_trade_flows_with(&reporter, &periods, partners.as_deref(), !args.no_mirror, &options)
        .await?;
    tracing::info!("{} periods in the balance", rows.len());

    print_balance(&rows, format)?;
    log_summary(client);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> TradeFlowsArgs {
        TradeFlowsArgs {
            reporter: "508".into(),
            period: None,
            years: Some("2019-2021".into()),
            partner: "0".into(),
            all_partners: false,
            no_mirror: false,
            flags: FetchFlags {
                no_cache: false,
                no_retry_empty: false,
                period_size: 12,
            },
        }
    }

    #[test]
    fn periods_from_year_range() {
        assert_eq!(args().periods().unwrap(), vec!["2019", "2020", "2021"]);
    }

    #[test]
    fn monthly_periods_rejected() {
        let mut a = args();
        a.years = None;
        a.period = Some("202001".into());
        assert!(a.periods().is_err());
    }

    #[test]
    fn partner_selection() {
        let book = CodeBook::default().with_country("620", "Portugal");
        let mut a = args();
        assert_eq!(a.partners(&book).unwrap().as_deref(), Some("0"));

        a.partner = "Portugal,76".into();
        assert_eq!(a.partners(&book).unwrap().as_deref(), Some("620,76"));

        a.all_partners = true;
        assert_eq!(a.partners(&book).unwrap(), None);
    }
}
