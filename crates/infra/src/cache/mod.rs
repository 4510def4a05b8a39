//! Hot-path caches in front of the read models.
//!
//! Both caches are advisory: a miss falls back to the read model, and the
//! projections keep them warm.

pub mod product;
#[cfg(feature = "redis")]
pub mod redis;
pub mod stock;

pub use product::{DEFAULT_PRODUCT_TTL, InMemoryProductCache, ProductCache};
#[cfg(feature = "redis")]
pub use redis::{RedisCacheError, RedisProductCache, RedisStockCache};
pub use stock::{Decrement, InMemoryStockCache, StockCache};
