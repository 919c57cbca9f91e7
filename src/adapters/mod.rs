pub mod memory;
pub mod postgres;
pub mod redis_cache;

pub use memory::{MemoryCache, MemoryJobQueue, MemoryOrderStore};
pub use postgres::PostgresStore;
pub use redis_cache::RedisCache;
