//! Simulated venue: fixed latency, table-driven base price, bounded random
//! variance, fee and slippage. Each concrete venue supplies its own
//! [`VenueProfile`]; the economics differ per venue and stay that way.

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info};

use super::DexVenue;
use crate::domain::{DexName, Quote, QuoteRequest, SwapExecution};
use crate::error::Result;

/// Price used when a pair is missing from the venue's table
pub const FALLBACK_BASE_PRICE: f64 = 100.0;

/// Execution slippage is uniform in `[-MAX_SLIPPAGE, +MAX_SLIPPAGE)`
pub const MAX_SLIPPAGE: f64 = 0.005;

/// Pricing parameters of one venue
#[derive(Debug, Clone, Copy)]
pub struct VenueProfile {
    pub name: DexName,
    /// `(pair key, base price)`, pair key formatted `IN-OUT`
    pub price_table: &'static [(&'static str, f64)],
    /// Price variance is uniform in `[-variance, +variance)`
    pub variance: f64,
    /// Fee is uniform in `[fee_floor, fee_floor + fee_spread)`
    pub fee_floor: f64,
    pub fee_spread: f64,
    /// Liquidity is uniform in `[liquidity_floor, liquidity_floor + liquidity_spread)`
    pub liquidity_floor: f64,
    pub liquidity_spread: f64,
}

impl VenueProfile {
    pub fn base_price(&self, pair_key: &str) -> f64 {
        self.price_table
            .iter()
            .find(|(pair, _)| *pair == pair_key)
            .map(|(_, price)| *price)
            .unwrap_or(FALLBACK_BASE_PRICE)
    }

    /// Price a request. Pure apart from the random draws.
    pub fn price<R: Rng + ?Sized>(&self, request: &QuoteRequest, rng: &mut R) -> Quote {
        let base = self.base_price(&request.pair_key());
        let variance = rng.gen_range(-self.variance..self.variance);
        let price = base * (1.0 + variance);
        let fee = self.fee_floor + rng.gen::<f64>() * self.fee_spread;
        let liquidity = self.liquidity_floor + rng.gen::<f64>() * self.liquidity_spread;

        Quote::new(self.name, price, fee, liquidity, request.amount_in)
    }
}

/// Simulated latencies of a venue
#[derive(Debug, Clone, Copy, Default)]
pub struct VenueTiming {
    pub quote_delay: Duration,
    pub execution_delay: Duration,
    /// Upper bound of the random extra execution latency
    pub execution_jitter: Duration,
}

pub struct SimulatedVenue {
    profile: VenueProfile,
    timing: VenueTiming,
}

impl SimulatedVenue {
    pub fn new(profile: VenueProfile, timing: VenueTiming) -> Self {
        Self { profile, timing }
    }

    pub fn profile(&self) -> &VenueProfile {
        &self.profile
    }

    fn execution_latency(&self) -> Duration {
        let jitter_ms = self.timing.execution_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_ms)
        };
        self.timing.execution_delay + Duration::from_millis(extra)
    }

    /// `<venue>_<base36 millis>_<random>`
    fn settlement_reference(&self) -> String {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(13)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        format!("{}_{}_{}", self.profile.name, to_base36(millis), suffix)
    }
}

#[async_trait]
impl DexVenue for SimulatedVenue {
    fn name(&self) -> DexName {
        self.profile.name
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let started = Instant::now();
        debug!(dex = %self.profile.name, pair = %request.pair_key(), "Fetching quote");

        sleep(self.timing.quote_delay).await;

        let quote = self.profile.price(request, &mut rand::thread_rng());

        info!(
            dex = %quote.dex,
            price = quote.price,
            fee = quote.fee,
            total_cost = quote.total_cost,
            duration_ms = started.elapsed().as_millis() as u64,
            "Quote received"
        );
        Ok(quote)
    }

    async fn execute(&self, request: &QuoteRequest, quote: &Quote) -> Result<SwapExecution> {
        info!(dex = %self.profile.name, pair = %request.pair_key(), "Executing swap");

        sleep(self.execution_latency()).await;

        let slippage = rand::thread_rng().gen_range(-MAX_SLIPPAGE..MAX_SLIPPAGE);
        let executed_price = quote.price * (1.0 + slippage);
        let execution = SwapExecution {
            tx_hash: self.settlement_reference(),
            executed_price,
            amount_out: request.amount_in / executed_price,
            timestamp: Utc::now().timestamp_millis(),
        };

        info!(
            dex = %self.profile.name,
            tx_hash = %execution.tx_hash,
            executed_price = execution.executed_price,
            amount_out = execution.amount_out,
            "Swap executed"
        );
        Ok(execution)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
