use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

use super::comparator::{ComparisonResult, PriceComparator};
use super::DexVenue;
use crate::domain::{DexName, Quote, QuoteRequest, SwapExecution};
use crate::error::{Result, SwapError};

/// Fans quote requests out to every venue and dispatches execution to the
/// selected one.
#[derive(Clone)]
pub struct DexRouter {
    venues: Vec<Arc<dyn DexVenue>>,
}

impl DexRouter {
    pub fn new(venues: Vec<Arc<dyn DexVenue>>) -> Self {
        Self { venues }
    }

    pub fn venue_names(&self) -> Vec<DexName> {
        self.venues.iter().map(|v| v.name()).collect()
    }

    fn venue(&self, dex: DexName) -> Result<&Arc<dyn DexVenue>> {
        self.venues
            .iter()
            .find(|v| v.name() == dex)
            .ok_or_else(|| SwapError::Internal(format!("No venue registered for {}", dex)))
    }

    /// Query all venues concurrently. Any venue failure fails the whole call.
    pub async fn quotes(&self, request: &QuoteRequest) -> Result<Vec<Quote>> {
        try_join_all(self.venues.iter().map(|venue| venue.quote(request))).await
    }

    #[instrument(skip(self, request), fields(pair = %request.pair_key(), amount_in = request.amount_in))]
    pub async fn best_quote(&self, request: &QuoteRequest) -> Result<ComparisonResult> {
        let started = Instant::now();
        let quotes = self.quotes(request).await?;
        let result = PriceComparator::compare(&quotes)?;

        info!(
            selected_dex = %result.selected_dex(),
            savings = result.savings,
            duration_ms = started.elapsed().as_millis() as u64,
            "{}",
            result.summary()
        );
        Ok(result)
    }

    pub async fn execute_swap(
        &self,
        request: &QuoteRequest,
        dex: DexName,
        quote: &Quote,
    ) -> Result<SwapExecution> {
        self.venue(dex)?.execute(request, quote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::MockDexVenue;

    fn request() -> QuoteRequest {
        QuoteRequest {
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 10.0,
        }
    }

    fn mock_venue(dex: DexName, price: f64) -> MockDexVenue {
        let mut venue = MockDexVenue::new();
        venue.expect_name().return_const(dex);
        venue
            .expect_quote()
            .returning(move |req| Ok(Quote::new(dex, price, 0.002, 1_000.0, req.amount_in)));
        venue
    }

    #[tokio::test]
    async fn best_quote_picks_cheapest_venue() {
        let router = DexRouter::new(vec![
            Arc::new(mock_venue(DexName::Raydium, 142.0)),
            Arc::new(mock_venue(DexName::Meteora, 141.0)),
        ]);

        let result = router.best_quote(&request()).await.unwrap();
        assert_eq!(result.selected_dex(), DexName::Meteora);
        assert_eq!(result.all_quotes.len(), 2);
    }

    #[tokio::test]
    async fn any_quote_failure_fails_the_comparison() {
        let mut broken = MockDexVenue::new();
        broken.expect_name().return_const(DexName::Meteora);
        broken.expect_quote().returning(|_| {
            Err(SwapError::DexQuote {
                dex: "Meteora".to_string(),
                message: "pool unavailable".to_string(),
            })
        });

        let router = DexRouter::new(vec![
            Arc::new(mock_venue(DexName::Raydium, 142.0)),
            Arc::new(broken),
        ]);

        let err = router.best_quote(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Meteora quote failed: pool unavailable");
    }

    #[tokio::test]
    async fn execute_dispatches_to_named_venue() {
        let mut raydium = mock_venue(DexName::Raydium, 142.0);
        raydium.expect_execute().never();

        let mut meteora = mock_venue(DexName::Meteora, 141.0);
        meteora.expect_execute().times(1).returning(|req, quote| {
            Ok(SwapExecution {
                tx_hash: "meteora_test".to_string(),
                executed_price: quote.price,
                amount_out: req.amount_in / quote.price,
                timestamp: 0,
            })
        });

        let router = DexRouter::new(vec![Arc::new(raydium), Arc::new(meteora)]);
        let quote = Quote::new(DexName::Meteora, 141.0, 0.002, 1_000.0, 10.0);

        let exec = router
            .execute_swap(&request(), DexName::Meteora, &quote)
            .await
            .unwrap();
        assert_eq!(exec.tx_hash, "meteora_test");
    }

    #[tokio::test]
    async fn execute_on_unknown_venue_is_internal_error() {
        let router = DexRouter::new(vec![Arc::new(mock_venue(DexName::Raydium, 142.0))]);
        let quote = Quote::new(DexName::Meteora, 141.0, 0.002, 1_000.0, 10.0);

        let err = router
            .execute_swap(&request(), DexName::Meteora, &quote)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InternalServerError");
    }
}
