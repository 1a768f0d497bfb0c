//! Merges per-period results and checks them for duplicated totals.

use std::collections::BTreeSet;
use std::fmt;

use comtrade_api::types::TradeRecord;
use comtrade_api::{TradeQuery, WORLD_CODE};

use crate::codebook::CodeBook;

/// Normalization applied after concatenation.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssembleOptions {
    /// Drop world aggregate rows (partner code 0).
    pub remove_world: bool,
    /// Whether the query left the partner dimension open. World rows are
    /// only removed in that case; an explicit partner `0` is kept.
    pub partner_unconstrained: bool,
}

impl AssembleOptions {
    pub fn for_query(query: &TradeQuery, remove_world: bool) -> Self {
        Self {
            remove_world,
            partner_unconstrained: query.partner_unconstrained(),
        }
    }
}

/// Concatenates chunks in order, then applies `options`.
pub fn assemble(chunks: Vec<Vec<TradeRecord>>, options: &AssembleOptions) -> Vec<TradeRecord> {
    let rows: Vec<TradeRecord> = chunks.into_iter().flatten().collect();
    if options.remove_world && options.partner_unconstrained {
        remove_world(rows)
    } else {
        rows
    }
}

/// Drops rows whose partner is the world aggregate.
pub fn remove_world(rows: Vec<TradeRecord>) -> Vec<TradeRecord> {
    let before = rows.len();
    let rows: Vec<TradeRecord> = rows
        .into_iter()
        .filter(|r| r.partner_code != Some(WORLD_CODE))
        .collect();
    if rows.len() != before {
        tracing::debug!("Removed {} world rows", before - rows.len());
    }
    rows
}

/// Signs that summing `primaryValue` would count some trade twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    MixedMotCodes,
    MixedPartner2Codes,
    MixedCustomsCodes,
    MixedAggregateFlags,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MixedMotCodes => write!(
                f,
                "results mix motCode 0 (all) with transport details; totals may be duplicated. Filter on motCode 0 to drop details"
            ),
            Diagnostic::MixedPartner2Codes => write!(
                f,
                "results mix partner2Code 0 (all) with secondary partners; totals may be duplicated. Use partner2Code 0 to drop details"
            ),
            Diagnostic::MixedCustomsCodes => write!(
                f,
                "results mix customsCode C00 (all) with customs procedures; totals may be duplicated. Use customsCode C00 to drop details"
            ),
            Diagnostic::MixedAggregateFlags => write!(
                f,
                "results mix isAggregate values; check for duplicate results when aggregating"
            ),
        }
    }
}

/// Checks assembled rows for mixed aggregate/detail values and logs each
/// finding. Dimensions the query pinned explicitly are not checked.
pub fn diagnose(rows: &[TradeRecord], query: &TradeQuery) -> Vec<Diagnostic> {
    let mut found = Vec::new();

    if query.mot_code.is_none() {
        let mots: BTreeSet<i64> = rows.iter().filter_map(|r| r.mot_code).collect();
        if mots.len() > 1 && mots.contains(&0) {
            found.push(Diagnostic::MixedMotCodes);
        }
    }

    let partner2: BTreeSet<i64> = rows.iter().filter_map(|r| r.partner2_code).collect();
    if partner2.len() > 1 && partner2.contains(&WORLD_CODE) {
        found.push(Diagnostic::MixedPartner2Codes);
    }

    if query.customs_code.is_none() {
        let customs: BTreeSet<&str> = rows
            .iter()
            .filter_map(|r| r.customs_code.as_deref())
            .collect();
        if customs.len() > 1 && customs.contains("C00") {
            found.push(Diagnostic::MixedCustomsCodes);
        }
    }

    let aggregate: BTreeSet<bool> = rows.iter().filter_map(|r| r.is_aggregate).collect();
    if aggregate.len() > 1 {
        found.push(Diagnostic::MixedAggregateFlags);
    }

    for d in &found {
        tracing::warn!("{}", d);
    }
    found
}

/// Fills missing description columns (countries, flow, commodity, customs
/// procedure, transport mode) from the code book. Unknown codes
/// fall back to their own string form.
pub fn decode(rows: Vec<TradeRecord>, book: &CodeBook) -> Vec<TradeRecord> {
    rows.into_iter()
        .map(|mut row| {
            if row.reporter_desc.is_none() {
                row.reporter_desc = row.reporter_code.map(|c| book.decode_country(&c.to_string()));
            }
            if row.partner_desc.is_none() {
                row.partner_desc = row.partner_code.map(|c| book.decode_country(&c.to_string()));
            }
            if row.partner2_desc.is_none() {
                row.partner2_desc = row.partner2_code.map(|c| book.decode_country(&c.to_string()));
            }
            if row.flow_desc.is_none() {
                row.flow_desc = row.flow_code.as_deref().map(|c| book.decode_flow(c));
            }
            if row.cmd_desc.is_none() {
                row.cmd_desc = row.cmd_code.as_deref().map(|c| book.decode_commodity(c));
            }
            if row.customs_desc.is_none() {
                row.customs_desc = row.customs_code.as_deref().map(|c| book.decode_customs(c));
            }
            if row.mot_desc.is_none() {
                row.mot_desc = row.mot_code.map(|c| book.decode_mot(&c.to_string()));
            }
            row
        })
        .collect()
}
