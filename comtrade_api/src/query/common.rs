//! Shared query infrastructure: the [`Query`] trait, [`QueryCommon`] fields,
//! and the [`TypeCode`] / [`FreqCode`] path segments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Trait implemented by query builders. Provides URL serialization and
/// shared builder methods for the path segments every endpoint needs.
pub trait Query {
    /// Appends this query's parameters to the given URL, returning the modified URL.
    fn add_to_url(&self, url: &Url) -> Url;

    /// Returns a mutable reference to the common query fields.
    fn get_common(&mut self) -> &mut QueryCommon;

    /// Returns the common query fields.
    fn common(&self) -> &QueryCommon;

    /// Path below the base URL, e.g. `/C/A/HS`.
    fn path(&self) -> String {
        let common = self.common();
        format!(
            "/{}/{}/{}",
            common.type_code, common.freq_code, common.cl_code
        )
    }

    /// Sets the product type (goods or services).
    fn with_type_code(mut self, type_code: TypeCode) -> Self
    where
        Self: Sized,
    {
        self.get_common().type_code = type_code;
        self
    }

    /// Sets the frequency (annual or monthly).
    fn with_freq_code(mut self, freq_code: FreqCode) -> Self
    where
        Self: Sized,
    {
        self.get_common().freq_code = freq_code;
        self
    }

    /// Sets the classification code (e.g. `HS`, `S4`, `EB`).
    fn with_classification(mut self, cl_code: &str) -> Self
    where
        Self: Sized,
    {
        self.get_common().cl_code = cl_code.to_string();
        self
    }

    /// Asks the service to include description columns in the rows.
    fn with_include_desc(mut self, include_desc: bool) -> Self
    where
        Self: Sized,
    {
        self.get_common().include_desc = include_desc;
        self
    }
}

/// Product type segment of the endpoint path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCode {
    /// Goods (`C`). This is the default.
    #[default]
    #[serde(rename = "C")]
    Commodities,
    /// Services (`S`).
    #[serde(rename = "S")]
    Services,
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeCode::Commodities => write!(f, "C"),
            TypeCode::Services => write!(f, "S"),
        }
    }
}

impl FromStr for TypeCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" | "c" => Ok(TypeCode::Commodities),
            "S" | "s" => Ok(TypeCode::Services),
            _ => Err(()),
        }
    }
}

/// Frequency segment of the endpoint path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreqCode {
    /// Annual (`A`). This is the default.
    #[default]
    #[serde(rename = "A")]
    Annual,
    /// Monthly (`M`).
    #[serde(rename = "M")]
    Monthly,
}

impl fmt::Display for FreqCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreqCode::Annual => write!(f, "A"),
            FreqCode::Monthly => write!(f, "M"),
        }
    }
}

impl FromStr for FreqCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(FreqCode::Annual),
            "M" | "m" => Ok(FreqCode::Monthly),
            _ => Err(()),
        }
    }
}

/// Fields shared by all query types: path segments and the description flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCommon {
    /// Goods or services. Defaults to goods.
    pub type_code: TypeCode,
    /// Annual or monthly. Defaults to annual.
    pub freq_code: FreqCode,
    /// Classification code. Defaults to `HS`.
    pub cl_code: String,
    /// Whether the service should add `*Desc` columns. Defaults to true.
    pub include_desc: bool,
}

impl Default for QueryCommon {
    fn default() -> QueryCommon {
        QueryCommon {
            type_code: TypeCode::Commodities,
            freq_code: FreqCode::Annual,
            cl_code: "HS".to_string(),
            include_desc: true,
        }
    }
}

impl QueryCommon {
    /// Appends the common parameters to the URL.
    pub fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("includeDesc", if self.include_desc { "true" } else { "false" });
        url
    }
}
