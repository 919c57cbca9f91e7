pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod dex;
pub mod domain;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod processor;
pub mod queue;
pub mod retry;

pub use config::AppConfig;
pub use dex::{build_router, DexRouter, PriceComparator};
pub use domain::{CreateOrderRequest, Order, OrderStatus, OrderType};
pub use error::{Result, SwapError};
pub use notify::{ConnectionManager, OrderEvent};
pub use processor::{OrderProcessor, OrderValidator, ProcessorSettings};
pub use queue::{JobQueue, WorkerConfig, WorkerPool};
