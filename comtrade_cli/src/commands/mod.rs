//! CLI subcommand implementations.

pub mod clean_cache;
pub mod fetch;
pub mod leaderboards;
pub mod setup;
pub mod trade_flows;

use anyhow::{bail, Result};
use clap::Args;
use comtrade_lib::codebook::{plp_code_list, CodeBook};
use comtrade_lib::planner::year_range;
use comtrade_lib::validation;
use comtrade_lib::{CachedClient, FetchOptions, FreqCode, Query, TradeQuery, TypeCode};

/// Query dimensions shared by the retrieval subcommands.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Reporter country: M49 code or name, comma-separated (e.g. 156 or China)
    #[arg(long)]
    pub reporter: String,

    /// Partner country: M49 code or name, comma-separated; 0 for the world, plp for
    /// the Portuguese-speaking countries. Omit for every partner
    #[arg(long)]
    pub partner: Option<String>,

    /// Secondary partner code (defaults to 0, the total over all)
    #[arg(long)]
    pub partner2: Option<String>,

    /// Periods, comma-separated: YYYY for annual data, YYYYMM for monthly
    #[arg(long, conflicts_with = "years")]
    pub period: Option<String>,

    /// Inclusive year range, e.g. 2015-2022
    #[arg(long)]
    pub years: Option<String>,

    /// Flow codes, comma-separated (M imports, X exports, ...)
    #[arg(long, default_value = "M,X")]
    pub flow: String,

    /// Customs procedure code (C00 for all)
    #[arg(long)]
    pub customs: Option<String>,

    /// Mode of transport code (0 for all)
    #[arg(long)]
    pub mot: Option<String>,

    /// Product type: C goods, S services
    #[arg(long = "type", default_value = "C")]
    pub type_code: String,

    /// Frequency: A annual, M monthly
    #[arg(long, default_value = "A")]
    pub freq: String,

    /// Classification code
    #[arg(long, default_value = "HS")]
    pub classification: String,

    /// Print the request URL (key hidden) before fetching
    #[arg(long)]
    pub echo_url: bool,
}

impl QueryArgs {
    pub fn freq_code(&self) -> Result<FreqCode> {
        match self.freq.parse::<FreqCode>() {
            Ok(freq) => Ok(freq),
            Err(()) => bail!("invalid frequency '{}'. Use A (annual) or M (monthly)", self.freq),
        }
    }

    /// Resolved, validated period list from `--period` or `--years`.
    pub fn periods(&self) -> Result<Vec<String>> {
        let freq = self.freq_code()?;
        match (&self.period, &self.years) {
            (Some(period), _) => Ok(validation::validate_periods(period, freq)?),
            (None, Some(years)) => {
                let (start, end) = parse_year_span(years)?;
                Ok(validation::validate_periods(&year_range(start, end), freq)?)
            }
            (None, None) => bail!("either --period or --years is required"),
        }
    }

    /// Builds the query for commodity codes `cmd`.
    pub fn build_query(&self, cmd: &str, book: &CodeBook) -> Result<TradeQuery> {
        let type_code = match self.type_code.parse::<TypeCode>() {
            Ok(t) => t,
            Err(()) => bail!("invalid type '{}'. Use C (goods) or S (services)", self.type_code),
        };
        let mut query = TradeQuery::default()
            .with_type_code(type_code)
            .with_freq_code(self.freq_code()?)
            .with_classification(&self.classification.trim().to_uppercase());

        query.reporter_codes = resolve_countries(&self.reporter, book)?;
        if let Some(ref partner) = self.partner {
            query.partner_codes = resolve_countries(partner, book)?;
        }
        if let Some(ref partner2) = self.partner2 {
            query.partner2_code = Some(validation::validate_country_code(partner2)?);
        }
        query.periods = self.periods()?;
        query.flow_codes = validation::validate_flow_codes(&self.flow)?;
        query.cmd_codes = validation::validate_cmd_codes(cmd)?;
        if let Some(ref customs) = self.customs {
            query = query.with_customs_code(&validation::validate_customs_code(customs)?);
        }
        if let Some(ref mot) = self.mot {
            query = query.with_mot_code(&validation::validate_mot_code(mot)?);
        }
        Ok(query)
    }
}

/// Cache and retry switches shared by the retrieval subcommands.
#[derive(Args, Debug, Clone)]
pub struct FetchFlags {
    /// Bypass the disk cache
    #[arg(long)]
    pub no_cache: bool,

    /// Accept empty answers instead of retrying them
    #[arg(long)]
    pub no_retry_empty: bool,

    /// Periods per request
    #[arg(long, default_value = "12")]
    pub period_size: usize,
}

impl FetchFlags {
    pub fn options(&self) -> Result<FetchOptions> {
        if self.period_size == 0 {
            bail!("--period-size must be at least 1");
        }
        let mut options = FetchOptions::default()
            .with_retry_if_empty(!self.no_retry_empty)
            .with_period_size(self.period_size);
        if self.no_cache {
            options = options.without_cache();
        }
        Ok(options)
    }
}

/// Maps names to codes through the code book and expands `plp`.
pub fn resolve_countries(input: &str, book: &CodeBook) -> Result<Vec<String>> {
    let mut codes = Vec::new();
    for item in input.split(',').map(str::trim) {
        if item.eq_ignore_ascii_case("plp") {
            codes.extend(plp_code_list().split(',').map(str::to_string));
        } else if !item.is_empty() && item.chars().all(|c| c.is_ascii_digit()) {
            codes.push(validation::validate_country_code(item)?);
        } else {
            let code = book.encode_country(item);
            if code == item {
                bail!(
                    "unknown country '{}'. Use an M49 code, or run `comtrade setup` and add countries.csv to the support directory",
                    item
                );
            }
            codes.push(validation::validate_country_code(&code)?);
        }
    }
    Ok(codes)
}

/// Parses `START-END` (or a single year) into an inclusive range.
pub fn parse_year_span(input: &str) -> Result<(i32, i32)> {
    let (start, end) = match input.split_once('-') {
        Some((start, end)) => (start.trim(), end.trim()),
        None => (input.trim(), input.trim()),
    };
    let (Ok(start), Ok(end)) = (start.parse::<i32>(), end.parse::<i32>()) else {
        bail!("invalid year range '{}'. Expected format: 2015-2022", input);
    };
    Ok(validation::validate_year_range(start, end)?)
}

/// Logs the URL of the first request, with the key hidden.
pub fn echo_url(client: &CachedClient, query: &TradeQuery) -> Result<()> {
    eprintln!("{}", client.echo_url(query)?);
    Ok(())
}

/// One-line request summary after a retrieval command.
pub fn log_summary(client: &CachedClient) {
    let s = client.tracker().summary();
    tracing::info!(
        "Requests: {} made, {} succeeded, {} throttled, {} empty, {} failed, {} cache hits, {:.1}s backoff, {:.1}s throttled",
        s.requests_made,
        s.requests_succeeded,
        s.requests_rate_limited,
        s.requests_empty,
        s.requests_failed,
        s.cache_hits,
        s.total_backoff_secs,
        s.total_throttle_secs
    );
}
