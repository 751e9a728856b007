use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub(crate) type SessionHandle<S> = Arc<Mutex<S>>;

/// Correlates a client-held token with server-side state across requests.
#[async_trait]
pub(crate) trait SessionStore<S>: Send + Sync {
    async fn create(&self, state: S) -> String;

    async fn get(&self, id: &str) -> Option<SessionHandle<S>>;

    /// Drops a session ahead of its TTL. No endpoint ends sessions yet.
    #[cfg_attr(not(test), allow(dead_code))]
    async fn expire(&self, id: &str) -> bool;

    async fn purge_expired(&self) -> usize;

    async fn len(&self) -> usize;
}

struct Entry<S> {
    handle: SessionHandle<S>,
    last_used: Instant,
}

/// Process-local store with idle expiry and a capacity bound. When full, the
/// least recently used session is evicted.
pub(crate) struct InMemorySessionStore<S> {
    entries: RwLock<HashMap<String, Entry<S>>>,
    ttl: Option<Duration>,
    capacity: usize,
}

impl<S> InMemorySessionStore<S> {
    pub(crate) fn new(ttl: Option<Duration>, capacity: usize) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl, capacity: capacity.max(1) }
    }

    fn is_expired(&self, entry: &Entry<S>, now: Instant) -> bool {
        self.ttl.is_some_and(|ttl| now.duration_since(entry.last_used) >= ttl)
    }
}

#[async_trait]
impl<S: Send + 'static> SessionStore<S> for InMemorySessionStore<S> {
    async fn create(&self, state: S) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        entries.retain(|_, entry| !self.is_expired(entry, now));

        while entries.len() >= self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&oldest);
            tracing::info!(session_id = %oldest, "Evicted least recently used chat session");
            metrics::counter!("chat_sessions_evicted_total").increment(1);
        }

        entries.insert(id.clone(), Entry { handle: Arc::new(Mutex::new(state)), last_used: now });
        metrics::gauge!("chat_sessions_active").set(entries.len() as f64);

        id
    }

    async fn get(&self, id: &str) -> Option<SessionHandle<S>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let expired = self.is_expired(entries.get(id)?, now);
        if expired {
            entries.remove(id);
            metrics::gauge!("chat_sessions_active").set(entries.len() as f64);
            return None;
        }

        let entry = entries.get_mut(id)?;
        entry.last_used = now;
        Some(entry.handle.clone())
    }

    async fn expire(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(id).is_some();
        metrics::gauge!("chat_sessions_active").set(entries.len() as f64);
        removed
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let purged = before - entries.len();
        metrics::gauge!("chat_sessions_active").set(entries.len() as f64);
        purged
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
