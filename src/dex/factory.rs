use std::sync::Arc;
use std::time::Duration;

use super::meteora::meteora;
use super::raydium::raydium;
use super::simulated::VenueTiming;
use super::{DexRouter, DexVenue};
use crate::config::DexConfig;

/// Create the runtime router with both simulated venues from `DexConfig`.
pub fn build_router(config: &DexConfig) -> DexRouter {
    let execution_delay = Duration::from_millis(config.swap_execution_delay_ms);
    let execution_jitter = Duration::from_millis(config.swap_execution_jitter_ms);

    let venues: Vec<Arc<dyn DexVenue>> = vec![
        Arc::new(raydium(VenueTiming {
            quote_delay: Duration::from_millis(config.raydium_network_delay_ms),
            execution_delay,
            execution_jitter,
        })),
        Arc::new(meteora(VenueTiming {
            quote_delay: Duration::from_millis(config.meteora_network_delay_ms),
            execution_delay,
            execution_jitter,
        })),
    ];

    DexRouter::new(venues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DexName, QuoteRequest};

    #[tokio::test]
    async fn builds_both_venues() {
        let config = DexConfig {
            raydium_network_delay_ms: 0,
            meteora_network_delay_ms: 0,
            swap_execution_delay_ms: 0,
            swap_execution_jitter_ms: 0,
        };
        let router = build_router(&config);
        assert_eq!(router.venue_names(), vec![DexName::Raydium, DexName::Meteora]);

        let request = QuoteRequest {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 1.0,
        };
        let result = router.best_quote(&request).await.unwrap();
        assert_eq!(result.all_quotes.len(), 2);
    }
}
