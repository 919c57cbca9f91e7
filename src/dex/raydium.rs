use super::simulated::{SimulatedVenue, VenueProfile, VenueTiming};
use crate::domain::DexName;

pub const RAYDIUM_PROFILE: VenueProfile = VenueProfile {
    name: DexName::Raydium,
    price_table: &[
        ("SOL-USDC", 142.0),
        ("USDC-SOL", 1.0 / 142.0),
        ("SOL-USDT", 141.8),
        ("USDT-SOL", 1.0 / 141.8),
    ],
    variance: 0.02,
    fee_floor: 0.0025,
    fee_spread: 0.0005,
    liquidity_floor: 500_000.0,
    liquidity_spread: 500_000.0,
};

pub fn raydium(timing: VenueTiming) -> SimulatedVenue {
    SimulatedVenue::new(RAYDIUM_PROFILE, timing)
}
