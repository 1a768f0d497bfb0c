//! Code ↔ description lookups for countries, flows, customs procedures,
//! modes of transport and HS commodities.
//!
//! Tables are read from two-column CSV files (`code,description`, header
//! row required) in the support directory. A missing file yields an empty
//! table; lookups then fall back to the code itself.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ComtradeError;

pub const COUNTRIES_FILE: &str = "countries.csv";
pub const FLOWS_FILE: &str = "flows.csv";
pub const CUSTOMS_FILE: &str = "customs.csv";
pub const MOT_FILE: &str = "mot.csv";
pub const HS_FILE: &str = "hs.csv";

/// M49 codes of the Portuguese-speaking countries.
pub const PLP_CODES: [(i64, &str); 9] = [
    (24, "Angola"),
    (76, "Brazil"),
    (132, "Cabo Verde"),
    (624, "Guinea-Bissau"),
    (226, "Equatorial Guinea"),
    (508, "Mozambique"),
    (620, "Portugal"),
    (678, "Sao Tome and Principe"),
    (626, "Timor-Leste"),
];

/// Comma-joined [`PLP_CODES`], ready for a partner filter.
pub fn plp_code_list() -> String {
    PLP_CODES
        .iter()
        .map(|(code, _)| code.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Clone, Debug, Default)]
pub struct CodeBook {
    countries: HashMap<String, String>,
    countries_reverse: HashMap<String, String>,
    flows: HashMap<String, String>,
    customs: HashMap<String, String>,
    mot: HashMap<String, String>,
    hs: HashMap<String, String>,
}

impl CodeBook {
    /// Loads every table found in `dir`.
    pub fn load(dir: &Path) -> Result<Self, ComtradeError> {
        let mut book = CodeBook {
            countries: read_table(&dir.join(COUNTRIES_FILE))?,
            flows: read_table(&dir.join(FLOWS_FILE))?,
            customs: read_table(&dir.join(CUSTOMS_FILE))?,
            mot: read_table(&dir.join(MOT_FILE))?,
            hs: read_table(&dir.join(HS_FILE))?,
            ..Default::default()
        };
        book.rebuild_reverse();
        tracing::debug!(
            "Loaded code book from {}: {} countries, {} commodities",
            dir.display(),
            book.countries.len(),
            book.hs.len()
        );
        Ok(book)
    }

    fn rebuild_reverse(&mut self) {
        self.countries_reverse = self
            .countries
            .iter()
            .map(|(code, desc)| (desc.clone(), code.clone()))
            .collect();
    }

    pub fn with_country(mut self, code: &str, desc: &str) -> Self {
        self.countries.insert(code.to_string(), desc.to_string());
        self.rebuild_reverse();
        self
    }

    pub fn with_flow(mut self, code: &str, desc: &str) -> Self {
        self.flows.insert(code.to_string(), desc.to_string());
        self
    }

    pub fn with_commodity(mut self, code: &str, desc: &str) -> Self {
        self.hs.insert(code.to_string(), desc.to_string());
        self
    }

    pub fn with_customs(mut self, code: &str, desc: &str) -> Self {
        self.customs.insert(code.to_string(), desc.to_string());
        self
    }

    pub fn with_mot(mut self, code: &str, desc: &str) -> Self {
        self.mot.insert(code.to_string(), desc.to_string());
        self
    }

    pub fn decode_country(&self, code: &str) -> String {
        lookup(&self.countries, code)
    }

    /// Country name to code; unknown names are returned unchanged.
    pub fn encode_country(&self, name: &str) -> String {
        lookup(&self.countries_reverse, name)
    }

    pub fn decode_flow(&self, code: &str) -> String {
        lookup(&self.flows, code)
    }

    pub fn decode_commodity(&self, code: &str) -> String {
        lookup(&self.hs, code)
    }

    pub fn decode_customs(&self, code: &str) -> String {
        lookup(&self.customs, code)
    }

    pub fn decode_mot(&self, code: &str) -> String {
        lookup(&self.mot, code)
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
            && self.flows.is_empty()
            && self.customs.is_empty()
            && self.mot.is_empty()
            && self.hs.is_empty()
    }
}

fn lookup(table: &HashMap<String, String>, key: &str) -> String {
    table
        .get(key.trim())
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

fn read_table(path: &Path) -> Result<HashMap<String, String>, ComtradeError> {
    if !path.is_file() {
        tracing::debug!("Code table {} not found, skipping", path.display());
        return Ok(HashMap::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ComtradeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    let mut table = HashMap::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            ComtradeError::Config(format!("CSV parse error in {}: {}", path.display(), e))
        })?;
        if let (Some(code), Some(desc)) = (record.get(0), record.get(1)) {
            table.insert(code.trim().to_string(), desc.trim().to_string());
        }
    }
    Ok(table)
}

/// Flags hierarchical codes that are aggregates of the codes after them.
///
/// `codes` must be sorted. A code is an aggregate when the next distinct
/// code extends it (`"01"` before `"0101"`). Duplicates copy the flag of
/// their first occurrence.
pub fn mark_aggregate_codes(codes: &[&str]) -> Vec<bool> {
    let mut flags = vec![false; codes.len()];
    for i in 0..codes.len() {
        let current = codes[i];
        if i > 0 && codes[i - 1] == current {
            tracing::warn!("Code {} is duplicated at positions {} and {}", current, i - 1, i);
            continue;
        }
        let next_distinct = codes[i + 1..].iter().find(|c| **c != current);
        flags[i] = next_distinct.is_some_and(|next| next.starts_with(current));
    }
    for i in 1..codes.len() {
        if codes[i] == codes[i - 1] {
            flags[i] = flags[i - 1];
        }
    }
    flags
}
