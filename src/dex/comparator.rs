//! Best-venue selection over a set of quotes.
//!
//! Lower `total_cost` wins. Equal costs go to the venue whose name sorts
//! first, so the decision is deterministic for identical inputs.

use std::cmp::Ordering;

use crate::domain::{DexName, Quote};
use crate::error::{Result, SwapError};

/// Outcome of comparing venue quotes
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub best: Quote,
    /// Runner-up, absent when only one venue quoted
    pub runner_up: Option<Quote>,
    /// Every quote considered, in the order the venues were queried
    pub all_quotes: Vec<Quote>,
    /// `runner_up.total_cost - best.total_cost`, never negative
    pub savings: f64,
    /// Savings relative to the runner-up cost, in percent
    pub savings_percent: f64,
}

impl ComparisonResult {
    pub fn selected_dex(&self) -> DexName {
        self.best.dex
    }

    pub fn quote_for(&self, dex: DexName) -> Option<&Quote> {
        self.all_quotes.iter().find(|q| q.dex == dex)
    }

    /// Human-readable routing reason carried by the routing event
    pub fn reason(&self) -> String {
        format!("Better price (saves ${:.4})", self.savings)
    }

    pub fn summary(&self) -> String {
        match &self.runner_up {
            Some(other) => format!(
                "Selected {} (saves ${:.4} / {:.2}% vs {})",
                self.best.dex, self.savings, self.savings_percent, other.dex
            ),
            None => format!("Selected {} (only venue quoted)", self.best.dex),
        }
    }
}

pub struct PriceComparator;

impl PriceComparator {
    fn rank(a: &Quote, b: &Quote) -> Ordering {
        a.total_cost
            .partial_cmp(&b.total_cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.dex.as_str().cmp(b.dex.as_str()))
    }

    pub fn compare(quotes: &[Quote]) -> Result<ComparisonResult> {
        if quotes.is_empty() {
            return Err(SwapError::Internal(
                "No quotes available for comparison".to_string(),
            ));
        }

        let mut ranked: Vec<&Quote> = quotes.iter().collect();
        ranked.sort_by(|a, b| Self::rank(a, b));

        let best = ranked[0].clone();
        let runner_up = ranked.get(1).copied().cloned();

        let (savings, savings_percent) = match &runner_up {
            Some(other) => {
                let savings = (other.total_cost - best.total_cost).max(0.0);
                let percent = if other.total_cost > 0.0 {
                    savings / other.total_cost * 100.0
                } else {
                    0.0
                };
                (savings, percent)
            }
            None => (0.0, 0.0),
        };

        Ok(ComparisonResult {
            best,
            runner_up,
            all_quotes: quotes.to_vec(),
            savings,
            savings_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(dex: DexName, price: f64, fee: f64) -> Quote {
        Quote::new(dex, price, fee, 1_000_000.0, 10.0)
    }

    #[test]
    fn lower_total_cost_wins() {
        let raydium = quote(DexName::Raydium, 142.0, 0.0025);
        let meteora = quote(DexName::Meteora, 141.5, 0.002);

        let result = PriceComparator::compare(&[raydium.clone(), meteora.clone()]).unwrap();

        assert_eq!(result.selected_dex(), DexName::Meteora);
        assert_eq!(result.runner_up.as_ref().map(|q| q.dex), Some(DexName::Raydium));
        let expected = raydium.total_cost - meteora.total_cost;
        assert!((result.savings - expected).abs() < 1e-9);
        assert!((result.savings_percent - expected / raydium.total_cost * 100.0).abs() < 1e-9);
        assert!(result.savings >= 0.0);
    }

    #[test]
    fn fee_can_outweigh_a_lower_price() {
        let cheap_but_costly = quote(DexName::Meteora, 100.0, 0.05);
        let pricier_but_cheap = quote(DexName::Raydium, 101.0, 0.001);

        let result = PriceComparator::compare(&[cheap_but_costly, pricier_but_cheap]).unwrap();
        assert_eq!(result.selected_dex(), DexName::Raydium);
    }

    #[test]
    fn ties_break_on_venue_name() {
        let a = quote(DexName::Raydium, 140.0, 0.002);
        let b = quote(DexName::Meteora, 140.0, 0.002);

        let forward = PriceComparator::compare(&[a.clone(), b.clone()]).unwrap();
        let reverse = PriceComparator::compare(&[b, a]).unwrap();

        assert_eq!(forward.selected_dex(), DexName::Meteora);
        assert_eq!(reverse.selected_dex(), DexName::Meteora);
        assert_eq!(forward.savings, 0.0);
    }

    #[test]
    fn single_quote_has_no_savings() {
        let only = quote(DexName::Raydium, 142.0, 0.0025);
        let result = PriceComparator::compare(&[only]).unwrap();

        assert_eq!(result.selected_dex(), DexName::Raydium);
        assert!(result.runner_up.is_none());
        assert_eq!(result.savings, 0.0);
        assert_eq!(result.savings_percent, 0.0);
        assert!(result.summary().contains("only venue"));
    }

    #[test]
    fn all_quotes_keep_query_order() {
        let raydium = quote(DexName::Raydium, 142.0, 0.0);
        let meteora = quote(DexName::Meteora, 141.0, 0.0);

        let result = PriceComparator::compare(&[raydium, meteora]).unwrap();

        let order: Vec<DexName> = result.all_quotes.iter().map(|q| q.dex).collect();
        assert_eq!(order, vec![DexName::Raydium, DexName::Meteora]);
        assert_eq!(result.selected_dex(), DexName::Meteora);
        assert_eq!(result.runner_up.as_ref().map(|q| q.dex), Some(DexName::Raydium));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(PriceComparator::compare(&[]).is_err());
    }

    #[test]
    fn reason_and_summary_format() {
        let result = PriceComparator::compare(&[
            quote(DexName::Raydium, 142.0, 0.0),
            quote(DexName::Meteora, 141.0, 0.0),
        ])
        .unwrap();

        assert_eq!(result.reason(), "Better price (saves $1.0000)");
        assert!(result.summary().starts_with("Selected meteora (saves $1.0000 / 0.70% vs raydium)"));
        assert_eq!(result.quote_for(DexName::Raydium).map(|q| q.price), Some(142.0));
    }
}
