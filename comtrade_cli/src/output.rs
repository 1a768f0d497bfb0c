use anyhow::{bail, Result};
use comtrade_lib::cache::CacheEntryInfo;
use comtrade_lib::types::TradeRecord;
use comtrade_lib::{Annotated, TradeBalanceRow};
use serde::Serialize;
use serde_json::{Number, Value};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}

impl OutputFormat {
    pub fn parse(input: &str) -> Result<Self> {
        match input.to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => bail!(
                "unknown output format '{}'. Valid formats: table, json, csv, markdown",
                other
            ),
        }
    }
}

#[derive(Tabled, Serialize)]
struct RecordRow {
    #[tabled(rename = "Period")]
    #[serde(rename = "Period")]
    period: String,
    #[tabled(rename = "Reporter")]
    #[serde(rename = "Reporter")]
    reporter: String,
    #[tabled(rename = "Flow")]
    #[serde(rename = "Flow")]
    flow: String,
    #[tabled(rename = "Partner")]
    #[serde(rename = "Partner")]
    partner: String,
    #[tabled(rename = "Commodity")]
    #[serde(rename = "Commodity")]
    commodity: String,
    #[tabled(rename = "Value (USD)")]
    #[serde(rename = "Value (USD)")]
    value: String,
}

/// Raw columns for CSV export; the record's open column map cannot be
/// written as a CSV row.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordCsvRow {
    ref_year: Option<i32>,
    period: Option<String>,
    reporter_code: Option<i64>,
    reporter_desc: Option<String>,
    flow_code: Option<String>,
    partner_code: Option<i64>,
    partner_desc: Option<String>,
    partner2_code: Option<i64>,
    cmd_code: Option<String>,
    cmd_desc: Option<String>,
    customs_code: Option<String>,
    customs_desc: Option<String>,
    mot_code: Option<i64>,
    mot_desc: Option<String>,
    primary_value: Option<f64>,
}

#[derive(Tabled, Serialize)]
struct RankedRow {
    #[tabled(rename = "Year")]
    #[serde(rename = "Year")]
    year: String,
    #[tabled(rename = "Reporter")]
    #[serde(rename = "Reporter")]
    reporter: String,
    #[tabled(rename = "Flow")]
    #[serde(rename = "Flow")]
    flow: String,
    #[tabled(rename = "Rank")]
    #[serde(rename = "Rank")]
    rank: String,
    #[tabled(rename = "Name")]
    #[serde(rename = "Name")]
    name: String,
    #[tabled(rename = "Total")]
    #[serde(rename = "Total")]
    total: String,
    #[tabled(rename = "Share")]
    #[serde(rename = "Share")]
    share: String,
    #[tabled(rename = "Sub Rank")]
    #[serde(rename = "Sub Rank")]
    sub_rank: String,
    #[tabled(rename = "Sub Name")]
    #[serde(rename = "Sub Name")]
    sub_name: String,
    #[tabled(rename = "Sub Value")]
    #[serde(rename = "Sub Value")]
    sub_value: String,
    #[tabled(rename = "Sub Share")]
    #[serde(rename = "Sub Share")]
    sub_share: String,
}

#[derive(Tabled, Serialize)]
struct BalanceRow {
    #[tabled(rename = "Period")]
    period: String,
    #[tabled(rename = "Imports (M)")]
    imports: String,
    #[tabled(rename = "Exports (X)")]
    exports: String,
    #[tabled(rename = "Partner Imports (X<M)")]
    mirror_exports: String,
    #[tabled(rename = "Partner Exports (M<X)")]
    mirror_imports: String,
    #[tabled(rename = "Balance (X-M)")]
    balance: String,
    #[tabled(rename = "Balance (X<M-M)")]
    mirror_balance: String,
    #[tabled(rename = "Volume (X+M)")]
    volume: String,
    #[tabled(rename = "Volume (X<M+M)")]
    mirror_volume: String,
}

#[derive(Tabled, Serialize)]
struct CacheRow {
    #[tabled(rename = "File")]
    #[serde(rename = "File")]
    file: String,
    #[tabled(rename = "Modified")]
    #[serde(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Age (days)")]
    #[serde(rename = "Age (days)")]
    age_days: String,
    #[tabled(rename = "Stale")]
    #[serde(rename = "Stale")]
    stale: bool,
}

/// Which level of a two-level leaderboard is the primary one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Leaderboard {
    Commodities,
    Partners,
}

impl Leaderboard {
    fn prefixes(self) -> (&'static str, &'static str) {
        match self {
            Leaderboard::Commodities => ("cmd", "partner"),
            Leaderboard::Partners => ("partner", "cmd"),
        }
    }
}

// -- Row builders --

fn build_record_rows(rows: &[TradeRecord]) -> Vec<RecordRow> {
    rows.iter()
        .map(|r| RecordRow {
            period: r.period.clone().unwrap_or_default(),
            reporter: label(&r.reporter_desc, r.reporter_code.map(|c| c.to_string())),
            flow: label(&r.flow_desc, r.flow_code.clone()),
            partner: label(&r.partner_desc, r.partner_code.map(|c| c.to_string())),
            commodity: label(&r.cmd_desc, r.cmd_code.clone()),
            value: r.primary_value.map(format_value).unwrap_or_default(),
        })
        .collect()
}

fn build_record_csv_rows(rows: &[TradeRecord]) -> Vec<RecordCsvRow> {
    rows.iter()
        .map(|r| RecordCsvRow {
            ref_year: r.ref_year,
            period: r.period.clone(),
            reporter_code: r.reporter_code,
            reporter_desc: r.reporter_desc.clone(),
            flow_code: r.flow_code.clone(),
            partner_code: r.partner_code,
            partner_desc: r.partner_desc.clone(),
            partner2_code: r.partner2_code,
            cmd_code: r.cmd_code.clone(),
            cmd_desc: r.cmd_desc.clone(),
            customs_code: r.customs_code.clone(),
            customs_desc: r.customs_desc.clone(),
            mot_code: r.mot_code,
            mot_desc: r.mot_desc.clone(),
            primary_value: r.primary_value,
        })
        .collect()
}

fn build_ranked_rows(rows: &[Annotated<TradeRecord>], board: Leaderboard) -> Vec<RankedRow> {
    let (main, sub) = board.prefixes();
    let name_of = |r: &TradeRecord, prefix: &str| match prefix {
        "cmd" => label(&r.cmd_desc, r.cmd_code.clone()),
        _ => label(&r.partner_desc, r.partner_code.map(|c| c.to_string())),
    };
    rows.iter()
        .map(|a| {
            let col = |prefix: &str, suffix: &str| a.get(&format!("{}_{}", prefix, suffix));
            let has_sub = col(sub, "rank").is_some();
            RankedRow {
                year: a.row.ref_year.map(|y| y.to_string()).unwrap_or_default(),
                reporter: label(&a.row.reporter_desc, a.row.reporter_code.map(|c| c.to_string())),
                flow: label(&a.row.flow_desc, a.row.flow_code.clone()),
                rank: col(main, "rank").map(format_rank).unwrap_or_default(),
                name: name_of(&a.row, main),
                total: col(main, "sum").map(format_value).unwrap_or_default(),
                share: col(main, "upper_perc").map(format_share).unwrap_or_default(),
                sub_rank: col(sub, "rank").map(format_rank).unwrap_or_default(),
                sub_name: if has_sub { name_of(&a.row, sub) } else { String::new() },
                sub_value: col(sub, "sum").map(format_value).unwrap_or_default(),
                sub_share: col(sub, "upper_perc").map(format_share).unwrap_or_default(),
            }
        })
        .collect()
}

fn build_balance_rows(rows: &[TradeBalanceRow]) -> Vec<BalanceRow> {
    rows.iter()
        .map(|r| BalanceRow {
            period: r.period.clone(),
            imports: format_value(r.imports),
            exports: format_value(r.exports),
            mirror_exports: format_value(r.mirror_exports),
            mirror_imports: format_value(r.mirror_imports),
            balance: format_value(r.balance),
            mirror_balance: format_value(r.mirror_balance),
            volume: format_value(r.volume),
            mirror_volume: format_value(r.mirror_volume),
        })
        .collect()
}

fn build_cache_rows(entries: &[CacheEntryInfo]) -> Vec<CacheRow> {
    entries
        .iter()
        .map(|e| CacheRow {
            file: e
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            modified: e
                .modified
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            age_days: format!("{:.1}", e.age.as_secs_f64() / 86_400.0),
            stale: e.stale,
        })
        .collect()
}

/// Ranked rows as JSON objects: every record column plus the derived ones.
/// Non-finite numbers become `null`.
fn ranked_json(rows: &[Annotated<TradeRecord>]) -> Result<Vec<Value>> {
    rows.iter()
        .map(|a| {
            let mut value = serde_json::to_value(&a.row)?;
            if let Value::Object(ref mut map) = value {
                for (name, v) in &a.columns {
                    let number = Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null);
                    map.insert(name.clone(), number);
                }
            }
            Ok(value)
        })
        .collect()
}

// -- Shared renderers --

fn print_rows<T: Tabled + Serialize>(rows: Vec<T>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Markdown => {
            let mut table = Table::new(rows);
            table.with(Style::markdown());
            println!("{}", table);
        }
        OutputFormat::Csv => print_csv(&rows)?,
        OutputFormat::Json => print_json(&rows),
    }
    Ok(())
}

fn print_csv<T: Serialize>(rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

// -- Public printers --

pub fn print_records(rows: &[TradeRecord], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&rows);
            Ok(())
        }
        OutputFormat::Csv => print_csv(&build_record_csv_rows(rows)),
        _ => print_rows(build_record_rows(rows), format),
    }
}

pub fn print_ranked(
    rows: &[Annotated<TradeRecord>],
    board: Leaderboard,
    format: &OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&ranked_json(rows)?);
            Ok(())
        }
        _ => print_rows(build_ranked_rows(rows, board), format),
    }
}

pub fn print_balance(rows: &[TradeBalanceRow], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&rows);
            Ok(())
        }
        OutputFormat::Csv => print_csv(rows),
        _ => print_rows(build_balance_rows(rows), format),
    }
}

pub fn print_cache_entries(entries: &[CacheEntryInfo], format: &OutputFormat) -> Result<()> {
    print_rows(build_cache_rows(entries), format)
}

// -- JSON output --

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

fn label(desc: &Option<String>, code: Option<String>) -> String {
    desc.clone().or(code).unwrap_or_default()
}

fn format_value(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    if !abs.is_finite() {
        format!("{}", value)
    } else if abs >= 1_000_000_000.0 {
        format!("{}${:.1}B", sign, abs / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{}${:.1}M", sign, abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{}${:.1}K", sign, abs / 1_000.0)
    } else {
        format!("{}${:.0}", sign, abs)
    }
}

fn format_share(value: f64) -> String {
    if value.is_finite() {
        format!("{:.1}%", value * 100.0)
    } else {
        "n/a".to_string()
    }
}

fn format_rank(value: f64) -> String {
    format!("{}", value as u32)
}
