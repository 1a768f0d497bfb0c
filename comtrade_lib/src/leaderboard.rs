//! Ready-made leaderboards over assembled trade rows: top commodities,
//! top partners, and per-period trade balances.

use std::collections::BTreeMap;

use comtrade_api::types::TradeRecord;
use serde::Serialize;

use crate::analytics::{filter_rank, sort_rows, total_rank_perc, Annotated, RankSpec};
use crate::assembler::remove_world;
use crate::error::ComtradeError;

const VALUE: &str = "primaryValue";

/// Ranks commodities per reporter, year and flow.
///
/// Adds the `cmd_*` columns and keeps commodities ranked `top_n` or
/// better. With `top_partners`, every kept commodity is broken down by
/// partner (`partner_*` columns, ranked within the commodity) and only the
/// best `top_partners` partners are kept.
pub fn top_commodities(
    rows: &[TradeRecord],
    top_n: u32,
    top_partners: Option<u32>,
) -> Result<Vec<Annotated<TradeRecord>>, ComtradeError> {
    let cmd_keys = ["reporterCode", "refYear", "flowCode", "cmdCode"];
    let mut cmd = RankSpec::new(&cmd_keys, VALUE, "cmd");

    let Some(top_partners) = top_partners else {
        let ranked = total_rank_perc(rows, &cmd)?;
        let mut top = filter_rank(ranked, "cmd_rank", top_n);
        sort_rows(
            &mut top,
            &[("refYear", true), ("flowCode", true), ("cmd_rank", true)],
        );
        return Ok(top);
    };

    cmd = cmd.keep_duplicates();
    let ranked = total_rank_perc(rows, &cmd)?;
    let partner = RankSpec::new(
        &["reporterCode", "refYear", "flowCode", "cmdCode", "partnerCode"],
        VALUE,
        "partner",
    );
    let nested: Vec<Annotated<TradeRecord>> = total_rank_perc(&ranked, &partner)?
        .into_iter()
        .map(Annotated::flatten)
        .collect();

    let top = filter_rank(nested, "cmd_rank", top_n);
    let mut top = filter_rank(top, "partner_rank", top_partners);
    sort_rows(
        &mut top,
        &[
            ("refYear", true),
            ("flowCode", true),
            ("cmd_rank", true),
            ("partner_rank", true),
        ],
    );
    Ok(top)
}

/// Ranks partners per reporter, year and flow, ignoring world rows.
///
/// With `top_commodities`, each kept partner is broken down by commodity
/// (`cmd_*` columns ranked within the partner).
pub fn top_partners(
    rows: &[TradeRecord],
    top_n: u32,
    top_commodities: Option<u32>,
) -> Result<Vec<Annotated<TradeRecord>>, ComtradeError> {
    let rows = remove_world(rows.to_vec());
    let partner_keys = ["reporterCode", "refYear", "flowCode", "partnerCode"];
    let mut partner = RankSpec::new(&partner_keys, VALUE, "partner");

    let Some(top_commodities) = top_commodities else {
        let ranked = total_rank_perc(&rows, &partner)?;
        let mut top = filter_rank(ranked, "partner_rank", top_n);
        sort_rows(
            &mut top,
            &[("refYear", true), ("flowCode", true), ("partner_rank", true)],
        );
        return Ok(top);
    };

    partner = partner.keep_duplicates();
    let ranked = total_rank_perc(&rows, &partner)?;
    let cmd = RankSpec::new(
        &["reporterCode", "refYear", "flowCode", "partnerCode", "cmdCode"],
        VALUE,
        "cmd",
    );
    let nested: Vec<Annotated<TradeRecord>> = total_rank_perc(&ranked, &cmd)?
        .into_iter()
        .map(Annotated::flatten)
        .collect();

    let top = filter_rank(nested, "partner_rank", top_n);
    let mut top = filter_rank(top, "cmd_rank", top_commodities);
    sort_rows(
        &mut top,
        &[
            ("refYear", true),
            ("flowCode", true),
            ("partner_rank", true),
            ("cmd_rank", true),
        ],
    );
    Ok(top)
}

/// Import/export totals for one period.
///
/// `mirror_exports` (`X<M`) is what partners report importing from the
/// country; `mirror_imports` (`M<X`) is what partners report exporting
/// to it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TradeBalanceRow {
    pub period: String,
    pub imports: f64,
    pub exports: f64,
    pub mirror_exports: f64,
    pub mirror_imports: f64,
    /// `X - M`
    pub balance: f64,
    /// `X<M - M`
    pub mirror_balance: f64,
    /// `X + M`
    pub volume: f64,
    /// `X<M + M`
    pub mirror_volume: f64,
}

/// Builds the per-period balance table from the four flow datasets.
///
/// `mirror_imports` holds partner-reported imports (flow `M`, partner =
/// the country) and `mirror_exports` partner-reported exports. Values are
/// summed per period; a flow with no rows for a period counts as 0.
/// Rows come out sorted by period.
pub fn trade_balance(
    reported_imports: &[TradeRecord],
    reported_exports: &[TradeRecord],
    mirror_imports: &[TradeRecord],
    mirror_exports: &[TradeRecord],
) -> Vec<TradeBalanceRow> {
    let mut table: BTreeMap<String, TradeBalanceRow> = BTreeMap::new();
    accumulate(&mut table, reported_imports, |r| &mut r.imports);
    accumulate(&mut table, reported_exports, |r| &mut r.exports);
    // Partners' imports from the country are its exports as seen by them.
    accumulate(&mut table, mirror_imports, |r| &mut r.mirror_exports);
    accumulate(&mut table, mirror_exports, |r| &mut r.mirror_imports);

    table
        .into_values()
        .map(|mut row| {
            row.balance = row.exports - row.imports;
            row.mirror_balance = row.mirror_exports - row.imports;
            row.volume = row.exports + row.imports;
            row.mirror_volume = row.mirror_exports + row.imports;
            row
        })
        .collect()
}

fn accumulate(
    table: &mut BTreeMap<String, TradeBalanceRow>,
    rows: &[TradeRecord],
    slot: fn(&mut TradeBalanceRow) -> &mut f64,
) {
    for row in rows {
        let Some(period) = period_of(row) else {
            tracing::debug!("Skipping row without period in trade balance");
            continue;
        };
        let entry = table
            .entry(period.clone())
            .or_insert_with(|| TradeBalanceRow {
                period,
                ..Default::default()
            });
        *slot(entry) += row.primary_value.filter(|v| !v.is_nan()).unwrap_or(0.0);
    }
}

fn period_of(row: &TradeRecord) -> Option<String> {
    row.period
        .clone()
        .or_else(|| row.ref_year.map(|y| y.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::Columns;

    fn rec(year: i32, flow: &str, cmd: &str, partner: i64, value: f64) -> TradeRecord {
        TradeRecord {
            reporter_code: Some(156),
            ref_year: Some(year),
            period: Some(year.to_string()),
            flow_code: Some(flow.to_string()),
            cmd_code: Some(cmd.to_string()),
            partner_code: Some(partner),
            primary_value: Some(value),
            ..Default::default()
        }
    }

    fn sample() -> Vec<TradeRecord> {
        vec![
            rec(2021, "M", "27", 24, 100.0),
            rec(2021, "M", "27", 76, 40.0),
            rec(2021, "M", "26", 76, 80.0),
            rec(2021, "M", "10", 620, 5.0),
            rec(2021, "M", "TOTAL", 0, 225.0),
            rec(2020, "M", "27", 24, 10.0),
        ]
    }

    fn codes(rows: &[Annotated<TradeRecord>]) -> Vec<(i32, String, i64)> {
        rows.iter()
            .map(|a| {
                (
                    a.row.ref_year.unwrap_or_default(),
                    a.row.cmd_code.clone().unwrap_or_default(),
                    a.row.partner_code.unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn top_commodities_one_row_per_commodity() {
        let rows = remove_world(sample());
        let top = top_commodities(&rows, 2, None).unwrap();
        assert_eq!(
            codes(&top),
            vec![
                (2020, "27".to_string(), 24),
                (2021, "27".to_string(), 24),
                (2021, "26".to_string(), 76),
            ]
        );
        assert_eq!(top[1].get("cmd_sum"), Some(140.0));
        assert_eq!(top[2].get("cmd_rank"), Some(2.0));
    }

    #[test]
    fn top_commodities_with_partner_breakdown() {
        let rows = remove_world(sample());
        let top = top_commodities(&rows, 1, Some(1)).unwrap();
        assert_eq!(
            codes(&top),
            vec![(2020, "27".to_string(), 24), (2021, "27".to_string(), 24)]
        );
        let row = &top[1];
        assert_eq!(row.get("cmd_rank"), Some(1.0));
        assert_eq!(row.get("partner_rank"), Some(1.0));
        assert_eq!(row.get("partner_sum"), Some(100.0));
        assert_eq!(row.get("partner_upper_sum"), Some(140.0));
    }

    #[test]
    fn top_partners_drops_world() {
        let top = top_partners(&sample(), 5, None).unwrap();
        assert!(top.iter().all(|a| a.row.partner_code != Some(0)));
        let y2021: Vec<(i64, f64)> = top
            .iter()
            .filter(|a| a.row.ref_year == Some(2021))
            .map(|a| (a.row.partner_code.unwrap(), a.value("partner_rank").unwrap()))
            .collect();
        assert_eq!(y2021, vec![(76, 1.0), (24, 2.0), (620, 3.0)]);
    }

    #[test]
    fn top_partners_with_commodity_breakdown() {
        let top = top_partners(&sample(), 1, Some(1)).unwrap();
        let y2021: Vec<&Annotated<TradeRecord>> =
            top.iter().filter(|a| a.row.ref_year == Some(2021)).collect();
        assert_eq!(y2021.len(), 1);
        assert_eq!(y2021[0].row.partner_code, Some(76));
        assert_eq!(y2021[0].row.cmd_code.as_deref(), Some("26"));
        assert_eq!(y2021[0].get("partner_sum"), Some(120.0));
    }

    #[test]
    fn balance_math_and_missing_flows() {
        let imports = vec![rec(2020, "M", "TOTAL", 0, 100.0), rec(2021, "M", "TOTAL", 0, 50.0)];
        let exports = vec![rec(2020, "X", "TOTAL", 0, 70.0)];
        let mut mirror_m = rec(2020, "M", "TOTAL", 156, 80.0);
        mirror_m.reporter_code = Some(24);
        let mut mirror_m2 = rec(2020, "M", "TOTAL", 156, 5.0);
        mirror_m2.reporter_code = Some(76);
        let mirror_imports = vec![mirror_m, mirror_m2];
        let mirror_exports = vec![rec(2021, "X", "TOTAL", 156, 30.0)];

        let table = trade_balance(&imports, &exports, &mirror_imports, &mirror_exports);
        assert_eq!(table.len(), 2);

        let first = &table[0];
        assert_eq!(first.period, "2020");
        assert_eq!(first.balance, -30.0);
        assert_eq!(first.mirror_exports, 85.0);
        assert_eq!(first.mirror_balance, -15.0);
        assert_eq!(first.volume, 170.0);
        assert_eq!(first.mirror_volume, 185.0);
        assert_eq!(first.mirror_imports, 0.0);

        let second = &table[1];
        assert_eq!(second.period, "2021");
        assert_eq!(second.exports, 0.0);
        assert_eq!(second.balance, -50.0);
        assert_eq!(second.mirror_imports, 30.0);
    }

    #[test]
    fn balance_falls_back_to_ref_year() {
        let mut row = rec(2019, "M", "TOTAL", 0, 1.0);
        row.period = None;
        let table = trade_balance(&[row], &[], &[], &[]);
        assert_eq!(table[0].period, "2019");
    }
}
