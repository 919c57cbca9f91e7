use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution venue identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DexName {
    Raydium,
    Meteora,
}

impl DexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            DexName::Raydium => "raydium",
            DexName::Meteora => "meteora",
        }
    }

    /// Display name used in venue error messages
    pub fn label(&self) -> &'static str {
        match self {
            DexName::Raydium => "Raydium",
            DexName::Meteora => "Meteora",
        }
    }
}

impl fmt::Display for DexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DexName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "raydium" => Ok(DexName::Raydium),
            "meteora" => Ok(DexName::Meteora),
            _ => Err(format!("Unknown dex: {}", raw)),
        }
    }
}

/// Trade parameters a venue prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
}

impl QuoteRequest {
    /// Lookup key into a venue's price table, e.g. `SOL-USDC`
    pub fn pair_key(&self) -> String {
        format!("{}-{}", self.token_in, self.token_out)
    }
}

/// A venue's priced offer, valid momentarily
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub dex: DexName,
    pub price: f64,
    pub fee: f64,
    /// `price * (1 + fee)`
    pub total_cost: f64,
    pub liquidity: f64,
    /// `amount_in / price`
    pub estimated_amount_out: f64,
}

impl Quote {
    pub fn new(dex: DexName, price: f64, fee: f64, liquidity: f64, amount_in: f64) -> Self {
        Self {
            dex,
            price,
            fee,
            total_cost: price * (1.0 + fee),
            liquidity,
            estimated_amount_out: amount_in / price,
        }
    }
}

/// Result of executing a swap on a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapExecution {
    pub tx_hash: String,
    pub executed_price: f64,
    pub amount_out: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}
