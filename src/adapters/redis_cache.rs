use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::domain::Order;
use crate::error::Result;
use crate::persistence::{
    active_order_key, OrderCache, RateLimitStore, WindowHit, ACTIVE_ORDERS_SET,
    ACTIVE_ORDER_TTL_SECS,
};

/// Redis key prefix for ingress rate-limit counters: rate_limit:{client}
pub const RATE_LIMIT_KEY_PREFIX: &str = "rate_limit:";

/// Redis-backed live order cache and rate-limit counters
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }
}

#[async_trait]
impl OrderCache for RedisCache {
    async fn set_active(&self, order: &Order) -> Result<()> {
        let mut conn = self.conn();
        let json = serde_json::to_string(order)?;

        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(active_order_key(&order.id))
            .arg(&json)
            .arg("EX")
            .arg(ACTIVE_ORDER_TTL_SECS)
            .ignore()
            .cmd("SADD")
            .arg(ACTIVE_ORDERS_SET)
            .arg(&order.id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(order_id = %order.id, status = %order.status, "Cached active order");
        Ok(())
    }

    async fn get_active(&self, order_id: &str) -> Result<Option<Order>> {
        let mut conn = self.conn();
        let json: Option<String> = conn.get(active_order_key(order_id)).await?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn remove_active(&self, order_id: &str) -> Result<()> {
        let mut conn = self.conn();

        redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(active_order_key(order_id))
            .ignore()
            .cmd("SREM")
            .arg(ACTIVE_ORDERS_SET)
            .arg(order_id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        debug!(order_id, "Removed active order from cache");
        Ok(())
    }

    async fn active_order_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let mut ids: Vec<String> = conn.smembers(ACTIVE_ORDERS_SET).await?;
        ids.sort();
        Ok(ids)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for RedisCache {
    async fn hit(&self, key: &str, window_secs: u64) -> Result<WindowHit> {
        let mut conn = self.conn();
        let key = format!("{}{}", RATE_LIMIT_KEY_PREFIX, key);

        let count: u64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await?;
        let reset_in_secs = if ttl >= 0 { ttl as u64 } else { window_secs };

        Ok(WindowHit {
            count,
            reset_in_secs,
        })
    }
}
