//! In-memory store with a broadcast notification feed. Backs the test
//! suite and small single-process deployments.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::store::events::EventSource;
use crate::store::{KeyEvent, Store, StoreValue};

#[derive(Default)]
struct Inner {
    hashes: BTreeMap<String, HashMap<String, StoreValue>>,
    sets: BTreeMap<String, BTreeSet<String>>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    feed: broadcast::Sender<KeyEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(Inner::default()),
            feed,
        }
    }

    pub fn event_source(&self) -> MemoryEvents {
        MemoryEvents {
            rx: self.feed.subscribe(),
        }
    }

    fn emit(&self, key: &str, op: &str) {
        // No receivers is fine; events are best effort.
        let _ = self.feed.send(KeyEvent {
            key: key.to_string(),
            op: op.to_string(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// `*`-wildcard match, the subset of store glob syntax the key schema uses.
fn glob_match(pattern: &str, key: &str) -> bool {
    let mut rest = key;
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];
    let mut last: Option<&str> = None;
    for part in parts {
        if let Some(prev) = last.take() {
            match rest.find(prev) {
                Some(i) => rest = &rest[i + prev.len()..],
                None => return false,
            }
        }
        last = Some(part);
    }
    match last {
        // Pattern had no '*' at all: exact match required.
        None => rest.is_empty(),
        Some(tail) => tail.is_empty() || rest.ends_with(tail),
    }
}

impl Store for MemoryStore {
    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let inner = self.lock();
        let mut out: Vec<String> = inner
            .hashes
            .keys()
            .chain(inner.sets.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.as_text())).collect())
            .unwrap_or_default())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .map(|v| v.as_text()))
    }

    async fn hash_get_bytes(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.lock();
        Ok(inner
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .map(|v| v.clone().into_bytes()))
    }

    async fn hash_set(&self, key: &str, fields: Vec<(String, StoreValue)>) -> Result<()> {
        {
            let mut inner = self.lock();
            let hash = inner.hashes.entry(key.to_string()).or_default();
            for (field, value) in fields {
                hash.insert(field, value);
            }
        }
        self.emit(key, "hset");
        Ok(())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            if let Some(hash) = inner.hashes.get_mut(key) {
                hash.remove(field);
            }
        }
        self.emit(key, "hdel");
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.lock();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            inner
                .sets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string());
        }
        self.emit(key, "sadd");
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            if let Some(set) = inner.sets.get_mut(key) {
                set.remove(member);
                if set.is_empty() {
                    inner.sets.remove(key);
                }
            }
        }
        self.emit(key, "srem");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.hashes.remove(key);
            inner.sets.remove(key);
        }
        self.emit(key, "del");
        Ok(())
    }
}

pub struct MemoryEvents {
    rx: broadcast::Receiver<KeyEvent>,
}

impl EventSource for MemoryEvents {
    async fn next_event(&mut self, wait: Duration) -> Result<Option<KeyEvent>> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Ok(ev)) => Ok(Some(ev)),
            // Lagged receivers drop the overwritten events and move on.
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => Ok(None),
            Ok(Err(broadcast::error::RecvError::Closed)) => Ok(None),
            Err(_) => Ok(None),
        }
    }
}
