//! Redis-backed caches.
//!
//! Keys: `product::product::{id}` holds the product document as JSON with a
//! TTL; `stock:{id}` holds the quantity as an integer.

use std::time::Duration;

use redis::Commands;
use thiserror::Error;

use commerce_products::ProductId;
use commerce_search::ProductDocument;
use commerce_stock::StockId;

use super::product::ProductCache;
use super::stock::{Decrement, StockCache};

#[derive(Debug, Error)]
pub enum RedisCacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

fn product_key(id: &ProductId) -> String {
    format!("product::product::{id}")
}

fn stock_key(id: &StockId) -> String {
    format!("stock:{id}")
}

#[derive(Debug, Clone)]
pub struct RedisProductCache {
    client: redis::Client,
    ttl: Duration,
}

impl RedisProductCache {
    pub fn new(redis_url: &str, ttl: Duration) -> Result<Self, RedisCacheError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            ttl,
        })
    }

    fn connection(&self) -> Option<redis::Connection> {
        match self.client.get_connection() {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "redis product cache unavailable");
                None
            }
        }
    }

    fn write(&self, doc: &ProductDocument, only_if_present: bool) {
        let Some(mut conn) = self.connection() else { return };
        let Ok(json) = commerce_serializer::to_json(doc) else { return };

        let mut cmd = redis::cmd("SET");
        cmd.arg(product_key(&doc.id)).arg(json).arg("EX").arg(self.ttl.as_secs().max(1));
        if only_if_present {
            cmd.arg("XX");
        }
        if let Err(e) = cmd.query::<Option<String>>(&mut conn) {
            tracing::warn!(product_id = %doc.id, error = %e, "redis product cache write failed");
        }
    }
}

impl ProductCache for RedisProductCache {
    fn get(&self, id: &ProductId) -> Option<ProductDocument> {
        let mut conn = self.connection()?;
        let json: Option<String> = conn.get(product_key(id)).ok()?;
        commerce_serializer::from_json(&json?).ok()
    }

    fn put(&self, doc: ProductDocument) {
        self.write(&doc, false);
    }

    fn put_if_present(&self, doc: ProductDocument) {
        self.write(&doc, true);
    }

    fn evict(&self, id: &ProductId) {
        if let Some(mut conn) = self.connection() {
            let _: Result<i64, _> = conn.del(product_key(id));
        }
    }
}

/// `{status, value}`: `1` taken (value = remaining), `0` insufficient
/// (value = current), `-1` missing.
const TRY_DECREMENT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return {-1, 0}
end
current = tonumber(current)
local wanted = tonumber(ARGV[1])
if current < wanted then
    return {0, current}
end
return {1, redis.call('DECRBY', KEYS[1], wanted)}
"#;

#[derive(Debug, Clone)]
pub struct RedisStockCache {
    client: redis::Client,
    try_decrement: redis::Script,
}

impl RedisStockCache {
    pub fn new(redis_url: &str) -> Result<Self, RedisCacheError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            try_decrement: redis::Script::new(TRY_DECREMENT),
        })
    }

    fn connection(&self) -> Option<redis::Connection> {
        match self.client.get_connection() {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::warn!(error = %e, "redis stock cache unavailable");
                None
            }
        }
    }
}

impl StockCache for RedisStockCache {
    fn get(&self, id: &StockId) -> Option<i64> {
        let mut conn = self.connection()?;
        conn.get(stock_key(id)).ok()?
    }

    fn set(&self, id: &StockId, quantity: i64) {
        if let Some(mut conn) = self.connection() {
            if let Err(e) = conn.set::<_, _, ()>(stock_key(id), quantity) {
                tracing::warn!(stock_id = %id, error = %e, "redis stock cache write failed");
            }
        }
    }

    fn try_decrement(&self, id: &StockId, quantity: i64) -> Decrement {
        let Some(mut conn) = self.connection() else {
            return Decrement::Missing;
        };
        let result: Result<Vec<i64>, _> = self
            .try_decrement
            .key(stock_key(id))
            .arg(quantity)
            .invoke(&mut conn);
        match result.as_deref() {
            Ok([1, remaining]) => Decrement::Taken(*remaining),
            Ok([0, available]) => Decrement::Insufficient { available: *available },
            Ok(_) => Decrement::Missing,
            Err(e) => {
                tracing::warn!(stock_id = %id, error = %e, "redis stock decrement failed");
                Decrement::Missing
            }
        }
    }

    fn increment(&self, id: &StockId, quantity: i64) -> Option<i64> {
        let mut conn = self.connection()?;
        let exists: bool = conn.exists(stock_key(id)).ok()?;
        if !exists {
            return None;
        }
        conn.incr(stock_key(id), quantity).ok()
    }

    fn evict(&self, id: &StockId) {
        if let Some(mut conn) = self.connection() {
            let _: Result<i64, _> = conn.del(stock_key(id));
        }
    }
}
