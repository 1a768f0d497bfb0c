use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::common::{Query, QueryCommon};

/// Partner code the service uses for the synthetic "world" aggregate row.
pub const WORLD_CODE: i64 = 0;

/// One logical request for final trade data.
///
/// Multi-valued dimensions (reporters, partners, periods, commodities, flows)
/// are sent as comma-joined lists. An empty partner list leaves the partner
/// dimension unconstrained, in which case the service also returns a world
/// aggregate row (partner code [`WORLD_CODE`]).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuery {
    pub common: QueryCommon,
    pub reporter_codes: Vec<String>,
    pub partner_codes: Vec<String>,
    pub partner2_code: Option<String>,
    pub periods: Vec<String>,
    pub cmd_codes: Vec<String>,
    pub flow_codes: Vec<String>,
    pub customs_code: Option<String>,
    pub mot_code: Option<String>,
    pub extras: BTreeMap<String, String>,
}

impl Query for TradeQuery {
    fn get_common(&mut self) -> &mut QueryCommon {
        &mut self.common
    }
    fn common(&self) -> &QueryCommon {
        &self.common
    }
    fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        for (key, value) in self.to_query_pairs() {
            url.query_pairs_mut().append_pair(&key, &value);
        }
        self.common.add_to_url(&url)
    }
}

impl TradeQuery {
    pub fn with_reporter(mut self, code: &str) -> Self {
        self.reporter_codes.push(code.to_string());
        self
    }
    pub fn with_reporters(mut self, codes: &[&str]) -> Self {
        self.reporter_codes
            .extend(codes.iter().map(|c| c.to_string()));
        self
    }
    pub fn with_partner(mut self, code: &str) -> Self {
        self.partner_codes.push(code.to_string());
        self
    }
    pub fn with_partners(mut self, codes: &[&str]) -> Self {
        self.partner_codes
            .extend(codes.iter().map(|c| c.to_string()));
        self
    }
    pub fn with_partner2(mut self, code: &str) -> Self {
        self.partner2_code = Some(code.to_string());
        self
    }
    pub fn with_period(mut self, period: &str) -> Self {
        self.periods.push(period.to_string());
        self
    }
    pub fn with_periods(mut self, periods: &[&str]) -> Self {
        self.periods.extend(periods.iter().map(|p| p.to_string()));
        self
    }
    pub fn with_cmd_code(mut self, code: &str) -> Self {
        self.cmd_codes.push(code.to_string());
        self
    }
    pub fn with_flow_code(mut self, code: &str) -> Self {
        self.flow_codes.push(code.to_string());
        self
    }
    pub fn with_customs_code(mut self, code: &str) -> Self {
        self.customs_code = Some(code.to_string());
        self
    }
    pub fn with_mot_code(mut self, code: &str) -> Self {
        self.mot_code = Some(code.to_string());
        self
    }
    /// Adds a parameter the builder has no dedicated method for.
    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.insert(key.to_string(), value.to_string());
        self
    }

    /// True when no partner filter is set, so the service adds world rows.
    pub fn partner_unconstrained(&self) -> bool {
        self.partner_codes.is_empty()
    }

    /// Copy of this query restricted to the given comma-joined period group.
    pub fn for_sub_period(&self, sub_period: &str) -> TradeQuery {
        let mut query = self.clone();
        query.periods = sub_period.split(',').map(|p| p.to_string()).collect();
        query
    }

    /// Query parameters in a fixed order, extras last (sorted by key).
    /// The credential is not part of the query; the client appends it.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_list(&mut pairs, "reporterCode", &self.reporter_codes);
        push_list(&mut pairs, "period", &self.periods);
        push_list(&mut pairs, "partnerCode", &self.partner_codes);
        push_opt(&mut pairs, "partner2Code", &self.partner2_code);
        push_list(&mut pairs, "cmdCode", &self.cmd_codes);
        push_list(&mut pairs, "flowCode", &self.flow_codes);
        push_opt(&mut pairs, "customsCode", &self.customs_code);
        push_opt(&mut pairs, "motCode", &self.mot_code);
        for (key, value) in &self.extras {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }
}

fn push_list(pairs: &mut Vec<(String, String)>, key: &str, values: &[String]) {
    if !values.is_empty() {
        pairs.push((key.to_string(), values.join(",")));
    }
}

fn push_opt(pairs: &mut Vec<(String, String)>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        pairs.push((key.to_string(), value.clone()));
    }
}
