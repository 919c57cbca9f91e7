pub mod dex;
pub mod order;
pub mod state;

pub use dex::*;
pub use order::*;
pub use state::*;
