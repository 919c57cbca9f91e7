use super::simulated::{SimulatedVenue, VenueProfile, VenueTiming};
use crate::domain::DexName;

/// Slightly cheaper base prices than Raydium, wider variance, lower fees
pub const METEORA_PROFILE: VenueProfile = VenueProfile {
    name: DexName::Meteora,
    price_table: &[
        ("SOL-USDC", 141.5),
        ("USDC-SOL", 1.0 / 141.5),
        ("SOL-USDT", 141.3),
        ("USDT-SOL", 1.0 / 141.3),
    ],
    variance: 0.025,
    fee_floor: 0.002,
    fee_spread: 0.0005,
    liquidity_floor: 400_000.0,
    liquidity_spread: 400_000.0,
};

pub fn meteora(timing: VenueTiming) -> SimulatedVenue {
    SimulatedVenue::new(METEORA_PROFILE, timing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::raydium::RAYDIUM_PROFILE;

    #[test]
    fn venue_tables_disagree_on_known_pairs() {
        for pair in ["SOL-USDC", "SOL-USDT", "USDC-SOL"] {
            assert_ne!(
                METEORA_PROFILE.base_price(pair),
                RAYDIUM_PROFILE.base_price(pair)
            );
        }
        assert!(METEORA_PROFILE.base_price("SOL-USDC") < RAYDIUM_PROFILE.base_price("SOL-USDC"));
    }

    #[test]
    fn unknown_pairs_share_the_fallback() {
        assert_eq!(METEORA_PROFILE.base_price("JUP-BONK"), 100.0);
        assert_eq!(RAYDIUM_PROFILE.base_price("JUP-BONK"), 100.0);
    }
}
