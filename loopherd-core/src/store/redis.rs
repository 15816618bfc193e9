//! Redis-backed store client plus its keyspace-notification feed.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::error::Result;
use crate::store::events::EventSource;
use crate::store::{KeyEvent, Store, StoreValue};

pub struct RedisStore {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
    db: i64,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let db = client.get_connection_info().redis.db;
        Ok(Self { client, conn, db })
    }

    /// Keyspace notifications are off by default server-side; the
    /// listener is blind without them.
    pub async fn enable_keyspace_events(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let res: std::result::Result<(), redis::RedisError> = redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("KEA")
            .query_async(&mut conn)
            .await;
        if let Err(e) = res {
            warn!("could not enable keyspace notifications: {e}");
        }
        Ok(())
    }

    pub async fn event_source(&self) -> Result<RedisEvents> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        let prefix = format!("__keyspace@{}__:", self.db);
        pubsub.psubscribe(format!("{prefix}*")).await?;
        Ok(RedisEvents { pubsub, prefix })
    }
}

impl Store for RedisStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = conn.keys(pattern).await?;
        keys.sort();
        Ok(keys)
    }

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hash_get_bytes(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(key, field).await?)
    }

    async fn hash_set(&self, key: &str, fields: Vec<(String, StoreValue)>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let items: Vec<(String, Vec<u8>)> = fields
            .into_iter()
            .map(|(f, v)| (f, v.into_bytes()))
            .collect();
        conn.hset_multiple::<_, _, _, ()>(key, &items).await?;
        Ok(())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(key, field).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

pub struct RedisEvents {
    pubsub: redis::aio::PubSub,
    prefix: String,
}

impl EventSource for RedisEvents {
    async fn next_event(&mut self, wait: Duration) -> Result<Option<KeyEvent>> {
        let prefix = self.prefix.clone();
        let mut stream = self.pubsub.on_message();
        match tokio::time::timeout(wait, stream.next()).await {
            Ok(Some(msg)) => {
                let channel = msg.get_channel_name().to_string();
                let op: String = msg.get_payload().unwrap_or_default();
                let key = channel
                    .strip_prefix(&prefix)
                    .unwrap_or(channel.as_str())
                    .to_string();
                Ok(Some(KeyEvent { key, op }))
            }
            Ok(None) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}
