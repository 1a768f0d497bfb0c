//! Grouped subtotals, dense ranks and shares over tabular trade rows.
//!
//! Rows are addressed by column name through the [`Columns`] trait, using
//! the service's camelCase names (`reporterCode`, `cmdCode`, ...). Nothing
//! here mutates its input: annotated copies are returned instead.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use comtrade_api::types::TradeRecord;
use serde::Serialize;
use serde_json::Value;

use crate::error::ComtradeError;

/// One component of a grouping key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for KeyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPart::Int(v) => write!(f, "{}", v),
            KeyPart::Text(s) => f.write_str(s),
        }
    }
}

/// Values of the grouping columns for one row; `None` for a missing cell.
pub type GroupKey = Vec<Option<KeyPart>>;

/// Column access by name.
pub trait Columns {
    /// Value usable for grouping and equality.
    fn key(&self, column: &str) -> Option<KeyPart>;
    /// Numeric value, if the column holds a number.
    fn value(&self, column: &str) -> Option<f64>;
}

impl Columns for TradeRecord {
    fn key(&self, column: &str) -> Option<KeyPart> {
        let text = |v: &Option<String>| v.clone().map(KeyPart::Text);
        let int = |v: Option<i64>| v.map(KeyPart::Int);
        match column {
            "typeCode" => text(&self.type_code),
            "freqCode" => text(&self.freq_code),
            "refYear" => int(self.ref_year.map(i64::from)),
            "period" => text(&self.period),
            "reporterCode" => int(self.reporter_code),
            "reporterDesc" => text(&self.reporter_desc),
            "flowCode" => text(&self.flow_code),
            "flowDesc" => text(&self.flow_desc),
            "partnerCode" => int(self.partner_code),
            "partnerDesc" => text(&self.partner_desc),
            "partner2Code" => int(self.partner2_code),
            "partner2Desc" => text(&self.partner2_desc),
            "clCode" => text(&self.cl_code),
            "cmdCode" => text(&self.cmd_code),
            "cmdDesc" => text(&self.cmd_desc),
            "customsCode" => text(&self.customs_code),
            "customsDesc" => text(&self.customs_desc),
            "mosCode" => text(&self.mos_code),
            "motCode" => int(self.mot_code),
            "motDesc" => text(&self.mot_desc),
            "qtyUnitCode" => int(self.qty_unit_code),
            "isAggregate" => self.is_aggregate.map(|b| KeyPart::Text(b.to_string())),
            "primaryValue" => None,
            other => match self.extra.get(other)? {
                Value::Null => None,
                Value::String(s) => Some(KeyPart::Text(s.clone())),
                Value::Number(n) => Some(match n.as_i64() {
                    Some(i) => KeyPart::Int(i),
                    None => KeyPart::Text(n.to_string()),
                }),
                v => Some(KeyPart::Text(v.to_string())),
            },
        }
    }

    fn value(&self, column: &str) -> Option<f64> {
        match column {
            "primaryValue" => self.primary_value,
            "refYear" => self.ref_year.map(f64::from),
            "reporterCode" => self.reporter_code.map(|v| v as f64),
            "partnerCode" => self.partner_code.map(|v| v as f64),
            "partner2Code" => self.partner2_code.map(|v| v as f64),
            "motCode" => self.mot_code.map(|v| v as f64),
            "qtyUnitCode" => self.qty_unit_code.map(|v| v as f64),
            other => self.extra.get(other).and_then(Value::as_f64),
        }
    }
}

/// A row together with derived numeric columns, in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotated<R> {
    pub row: R,
    pub columns: Vec<(String, f64)>,
}

impl<R> Annotated<R> {
    pub fn new(row: R) -> Self {
        Self {
            row,
            columns: Vec::new(),
        }
    }

    /// Derived column value (not falling back to the inner row).
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| *v)
    }

    pub fn set(&mut self, column: &str, value: f64) {
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }
}

impl<R> Annotated<Annotated<R>> {
    /// Merges two annotation layers; outer columns follow inner ones.
    pub fn flatten(self) -> Annotated<R> {
        let mut inner = self.row;
        for (name, value) in self.columns {
            inner.set(&name, value);
        }
        inner
    }
}

impl<R: Columns> Columns for Annotated<R> {
    fn key(&self, column: &str) -> Option<KeyPart> {
        match self.get(column) {
            Some(v) if v.is_finite() && v.fract() == 0.0 => Some(KeyPart::Int(v as i64)),
            Some(v) => Some(KeyPart::Text(v.to_string())),
            None => self.row.key(column),
        }
    }

    fn value(&self, column: &str) -> Option<f64> {
        self.get(column).or_else(|| self.row.value(column))
    }
}

fn group_key<R: Columns>(row: &R, keys: &[&str]) -> GroupKey {
    keys.iter().map(|k| row.key(k)).collect()
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

/// Sum of `value_col` per distinct combination of `keys`.
/// Missing values contribute 0.
pub fn group_sums<R: Columns>(rows: &[R], keys: &[&str], value_col: &str) -> HashMap<GroupKey, f64> {
    let mut sums: HashMap<GroupKey, f64> = HashMap::new();
    for row in rows {
        *sums.entry(group_key(row, keys)).or_insert(0.0) +=
            present(row.value(value_col)).unwrap_or(0.0);
    }
    sums
}

/// Group sum broadcast back to every row: `out[i]` is the total of the
/// group row `i` belongs to.
pub fn subtotal<R: Columns>(rows: &[R], keys: &[&str], value_col: &str) -> Vec<f64> {
    let sums = group_sums(rows, keys, value_col);
    rows.iter()
        .map(|row| sums.get(&group_key(row, keys)).copied().unwrap_or(0.0))
        .collect()
}

/// Dense descending rank of `value_col` within each `keys` group.
///
/// The largest value ranks 1, ties share a rank and ranks have no gaps.
/// Rows without a value rank after every present value of their group.
pub fn rank<R: Columns>(rows: &[R], keys: &[&str], value_col: &str) -> Vec<u32> {
    let mut distinct: HashMap<GroupKey, Vec<f64>> = HashMap::new();
    for row in rows {
        let entry = distinct.entry(group_key(row, keys)).or_default();
        if let Some(v) = present(row.value(value_col)) {
            entry.push(v);
        }
    }
    for values in distinct.values_mut() {
        values.sort_by(|a, b| b.total_cmp(a));
        values.dedup();
    }

    rows.iter()
        .map(|row| {
            let values = &distinct[&group_key(row, keys)];
            let position = match present(row.value(value_col)) {
                Some(v) => values.partition_point(|&x| x > v),
                None => values.len(),
            };
            position as u32 + 1
        })
        .collect()
}

/// Parameters for [`total_rank_perc`].
#[derive(Clone, Debug)]
pub struct RankSpec {
    pub group_keys: Vec<String>,
    pub value_col: String,
    pub prefix: String,
    /// Defaults to `group_keys` without its last element.
    pub rank_keys: Option<Vec<String>>,
    /// Defaults to `group_keys` without its last element.
    pub perc_keys: Option<Vec<String>>,
    /// Keep one row per `group_keys` combination (the first).
    pub dedupe: bool,
}

impl RankSpec {
    pub fn new(group_keys: &[&str], value_col: &str, prefix: &str) -> Self {
        Self {
            group_keys: group_keys.iter().map(|s| s.to_string()).collect(),
            value_col: value_col.to_string(),
            prefix: prefix.to_string(),
            rank_keys: None,
            perc_keys: None,
            dedupe: true,
        }
    }

    pub fn with_rank_keys(mut self, keys: &[&str]) -> Self {
        self.rank_keys = Some(keys.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_perc_keys(mut self, keys: &[&str]) -> Self {
        self.perc_keys = Some(keys.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn keep_duplicates(mut self) -> Self {
        self.dedupe = false;
        self
    }

    pub fn column(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }
}

/// Adds `{prefix}_sum`, `{prefix}_rank`, `{prefix}_perc`,
/// `{prefix}_upper_sum` and `{prefix}_upper_perc` to every row.
///
/// * `_sum`: total of `value_col` over `group_keys`
/// * `_rank`: dense rank of `_sum` within `rank_keys`
/// * `_perc`: the row's own value over `_upper_sum`
/// * `_upper_sum`: total of `value_col` over `perc_keys`
/// * `_upper_perc`: `_sum / _upper_sum`
///
/// Division by zero follows IEEE semantics (`NaN` or infinity).
pub fn total_rank_perc<R: Columns + Clone>(
    rows: &[R],
    ranking: &RankSpec,
) -> Result<Vec<Annotated<R>>, ComtradeError> {
    if ranking.group_keys.is_empty() {
        return Err(ComtradeError::InvalidInput(
            "total_rank_perc needs at least one grouping column".to_string(),
        ));
    }
    let group_keys: Vec<&str> = ranking.group_keys.iter().map(String::as_str).collect();
    let parent = &group_keys[..group_keys.len() - 1];
    let rank_keys: Vec<&str> = match &ranking.rank_keys {
        Some(keys) => keys.iter().map(String::as_str).collect(),
        None => parent.to_vec(),
    };
    let perc_keys: Vec<&str> = match &ranking.perc_keys {
        Some(keys) => keys.iter().map(String::as_str).collect(),
        None => parent.to_vec(),
    };
    let sum_col = ranking.column("sum");

    let sums = subtotal(rows, &group_keys, &ranking.value_col);
    let upper = subtotal(rows, &perc_keys, &ranking.value_col);

    let mut annotated: Vec<Annotated<R>> = rows
        .iter()
        .zip(&sums)
        .map(|(row, &sum)| {
            let mut a = Annotated::new(row.clone());
            a.set(&sum_col, sum);
            a
        })
        .collect();

    let ranks = rank(&annotated, &rank_keys, &sum_col);
    for (i, a) in annotated.iter_mut().enumerate() {
        let own = present(a.row.value(&ranking.value_col)).unwrap_or(f64::NAN);
        a.set(&ranking.column("rank"), f64::from(ranks[i]));
        a.set(&ranking.column("perc"), own / upper[i]);
        a.set(&ranking.column("upper_sum"), upper[i]);
        a.set(&ranking.column("upper_perc"), sums[i] / upper[i]);
    }

    if ranking.dedupe {
        let mut seen: HashSet<GroupKey> = HashSet::new();
        annotated.retain(|a| seen.insert(group_key(a, &group_keys)));
    }
    Ok(annotated)
}

/// Keeps rows whose `rank_col` is at most `n`. Rows without the column are dropped.
pub fn filter_rank<R: Columns>(rows: Vec<R>, rank_col: &str, n: u32) -> Vec<R> {
    rows.into_iter()
        .filter(|row| row.value(rank_col).is_some_and(|r| r <= f64::from(n)))
        .collect()
}

/// Stable sort by several columns; `true` means ascending.
///
/// Numeric columns compare by value, others by key. Missing cells sort last.
pub fn sort_rows<R: Columns>(rows: &mut [R], by: &[(&str, bool)]) {
    rows.sort_by(|a, b| {
        for (col, ascending) in by {
            let ord = compare_column(a, b, col);
            let ord = if *ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn compare_column<R: Columns>(a: &R, b: &R, col: &str) -> Ordering {
    match (a.value(col), b.value(col)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (a.key(col), b.key(col)) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}
