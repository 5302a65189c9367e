use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Asset classification of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Stock,
    Bond,
    Etf,
    Fund,
    Futures,
    Options,
    Forex,
    Crypto,
    Index,
    Commodity,
}

impl AssetType {
    /// Returns the string representation used in cache keys and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Bond => "bond",
            Self::Etf => "etf",
            Self::Fund => "fund",
            Self::Futures => "futures",
            Self::Options => "options",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
            Self::Index => "index",
            Self::Commodity => "commodity",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "bond" => Ok(Self::Bond),
            "etf" => Ok(Self::Etf),
            "fund" => Ok(Self::Fund),
            "futures" => Ok(Self::Futures),
            "options" => Ok(Self::Options),
            "forex" => Ok(Self::Forex),
            "crypto" => Ok(Self::Crypto),
            "index" => Ok(Self::Index),
            "commodity" => Ok(Self::Commodity),
            other => Err(MarketDataError::InvalidQuery(format!(
                "unknown asset type '{other}'"
            ))),
        }
    }
}

/// Market (exchange region) of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    Cn,
    Us,
    Hk,
    Eu,
    Jp,
    Global,
}

impl Market {
    /// Returns the string representation used in cache keys and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cn => "cn",
            Self::Us => "us",
            Self::Hk => "hk",
            Self::Eu => "eu",
            Self::Jp => "jp",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cn" => Ok(Self::Cn),
            "us" => Ok(Self::Us),
            "hk" => Ok(Self::Hk),
            "eu" => Ok(Self::Eu),
            "jp" => Ok(Self::Jp),
            "global" => Ok(Self::Global),
            other => Err(MarketDataError::InvalidQuery(format!(
                "unknown market '{other}'"
            ))),
        }
    }
}
