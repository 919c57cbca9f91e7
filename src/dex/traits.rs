use async_trait::async_trait;

use crate::domain::{DexName, Quote, QuoteRequest, SwapExecution};
use crate::error::Result;

/// An execution venue: prices a trade, then executes it against its quote.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DexVenue: Send + Sync {
    fn name(&self) -> DexName;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;

    async fn execute(&self, request: &QuoteRequest, quote: &Quote) -> Result<SwapExecution>;
}
