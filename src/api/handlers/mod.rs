pub mod health;
pub mod orders;
pub mod queue;

pub use health::*;
pub use orders::*;
pub use queue::*;
