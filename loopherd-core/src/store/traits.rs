use std::collections::HashMap;

use crate::error::Result;

/// Hash-field payload. Loop and bookkeeping fields are text; colormap
/// encodings and auxiliary images are raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreValue {
    Text(String),
    Blob(Vec<u8>),
}

impl StoreValue {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            StoreValue::Text(s) => s.into_bytes(),
            StoreValue::Blob(b) => b,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            StoreValue::Text(s) => s.clone(),
            StoreValue::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        StoreValue::Text(s)
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        StoreValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for StoreValue {
    fn from(b: Vec<u8>) -> Self {
        StoreValue::Blob(b)
    }
}

/// One mutation observed on the change-notification feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    /// Mutation kind as reported by the store ("sadd", "del", "hset", ...).
    pub op: String,
}

pub fn text_fields(pairs: Vec<(String, String)>) -> Vec<(String, StoreValue)> {
    pairs
        .into_iter()
        .map(|(k, v)| (k, StoreValue::Text(v)))
        .collect()
}

/// Key/value, hash and set operations against the state store. No
/// client-side locking; callers rely on idempotent recomputation.
#[allow(async_fn_in_trait)]
pub trait Store: Send + Sync {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Undecoded field read for binary payloads.
    async fn hash_get_bytes(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    async fn hash_set(&self, key: &str, fields: Vec<(String, StoreValue)>) -> Result<()>;

    async fn hash_del(&self, key: &str, field: &str) -> Result<()>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    async fn set_add(&self, key: &str, member: &str) -> Result<()>;

    /// Removing the last member drops the key, as Redis does.
    async fn set_remove(&self, key: &str, member: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
