//! MySQL-backed read store: one JSON document per key in `read_models`,
//! partitioned by collection name.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::{MySqlPool, Row};
use tokio::runtime::Handle;

use super::ReadStore;
use crate::db;

pub struct MySqlReadStore<K, V> {
    pool: Arc<MySqlPool>,
    handle: Handle,
    collection: String,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> MySqlReadStore<K, V> {
    /// Returns `None` outside a tokio runtime.
    pub fn new(pool: MySqlPool, collection: impl Into<String>) -> Option<Self> {
        let handle = Handle::try_current().ok()?;
        Some(Self {
            pool: Arc::new(pool),
            handle,
            collection: collection.into(),
            _marker: PhantomData,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl<K, V> ReadStore<K, V> for MySqlReadStore<K, V>
where
    K: Display + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let row = db::block_on(&self.handle, async {
            sqlx::query("SELECT body FROM read_models WHERE collection = ? AND doc_key = ?")
                .bind(&self.collection)
                .bind(key.to_string())
                .fetch_optional(&*self.pool)
                .await
        });

        match row {
            Ok(Some(row)) => {
                let body: JsonValue = row.try_get("body").ok()?;
                commerce_serializer::from_value(body).ok()
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(collection = %self.collection, error = %e, "read model lookup failed");
                None
            }
        }
    }

    fn upsert(&self, key: K, value: V) {
        let body = match commerce_serializer::to_value(&value) {
            Ok(body) => body,
            Err(_) => return,
        };
        let result = db::block_on(&self.handle, async {
            sqlx::query(
                r#"
                INSERT INTO read_models (collection, doc_key, body)
                VALUES (?, ?, ?)
                ON DUPLICATE KEY UPDATE body = VALUES(body)
                "#,
            )
            .bind(&self.collection)
            .bind(key.to_string())
            .bind(&body)
            .execute(&*self.pool)
            .await
        });
        if let Err(e) = result {
            tracing::warn!(collection = %self.collection, error = %e, "read model upsert failed");
        }
    }

    fn remove(&self, key: &K) {
        let result = db::block_on(&self.handle, async {
            sqlx::query("DELETE FROM read_models WHERE collection = ? AND doc_key = ?")
                .bind(&self.collection)
                .bind(key.to_string())
                .execute(&*self.pool)
                .await
        });
        if let Err(e) = result {
            tracing::warn!(collection = %self.collection, error = %e, "read model delete failed");
        }
    }

    fn list(&self) -> Vec<V> {
        let rows = db::block_on(&self.handle, async {
            sqlx::query("SELECT body FROM read_models WHERE collection = ?")
                .bind(&self.collection)
                .fetch_all(&*self.pool)
                .await
        });

        match rows {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| row.try_get::<JsonValue, _>("body").ok())
                .filter_map(|body| commerce_serializer::from_value(body).ok())
                .collect(),
            Err(e) => {
                tracing::warn!(collection = %self.collection, error = %e, "read model listing failed");
                vec![]
            }
        }
    }

    fn clear(&self) {
        let result = db::block_on(&self.handle, async {
            sqlx::query("DELETE FROM read_models WHERE collection = ?")
                .bind(&self.collection)
                .execute(&*self.pool)
                .await
        });
        if let Err(e) = result {
            tracing::warn!(collection = %self.collection, error = %e, "read model clear failed");
        }
    }
}
