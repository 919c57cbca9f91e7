//! Execution venues and best-price routing between them.

pub mod comparator;
pub mod factory;
pub mod meteora;
pub mod raydium;
pub mod router;
pub mod simulated;
pub mod traits;

pub use comparator::{ComparisonResult, PriceComparator};
pub use factory::build_router;
pub use router::DexRouter;
pub use simulated::{SimulatedVenue, VenueProfile, VenueTiming};
pub use traits::DexVenue;

#[cfg(test)]
pub use traits::MockDexVenue;
