use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

/// A generated answer as stored in the cache, including the model and
/// temperature it was produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnswer {
    pub answer: String,
    pub model: String,
    pub temperature: f32,
}

/// Derives the content-addressed cache key for a generation request.
///
/// Pure: whitespace around question and context is trimmed, the temperature
/// is rounded to three decimals, and the triple is serialized with stable
/// (alphabetical) key order before hashing, so equal inputs always map to the
/// same key.
pub fn response_cache_key(question: &str, context: &str, temperature: f32) -> String {
    let rounded = (f64::from(temperature) * 1000.0).round() / 1000.0;
    let payload = json!({
        "question": question.trim(),
        "context": context.trim(),
        "temperature": rounded,
    });

    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

struct CacheSlot {
    value: CachedAnswer,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheState {
    entries: HashMap<String, CacheSlot>,
    clock: u64,
}

/// Process-wide answer cache: fixed capacity with least-recently-used
/// eviction, and a per-entry time-to-live counted from insertion. Reads count
/// toward recency but never extend the TTL. All bookkeeping happens under a
/// single lock.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                clock: 0,
            }),
            ttl,
            capacity,
        }
    }

    pub async fn get(&self, key: &str) -> Option<CachedAnswer> {
        let mut state = self.state.lock().await;

        let expired = match state.entries.get(key) {
            Some(slot) => slot.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            state.entries.remove(key);
            debug!(key_prefix = key.get(..8).unwrap_or(key), "cache entry expired");
            return None;
        }

        state.clock += 1;
        let clock = state.clock;
        let slot = state.entries.get_mut(key)?;
        slot.last_used = clock;

        Some(slot.value.clone())
    }

    pub async fn insert(&self, key: String, value: CachedAnswer) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.lock().await;

        let ttl = self.ttl;
        state.entries.retain(|_, slot| slot.inserted_at.elapsed() < ttl);

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let evict = state
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone());
            if let Some(stale_key) = evict {
                debug!(
                    key_prefix = stale_key.get(..8).unwrap_or(&stale_key),
                    "evicting least recently used cache entry"
                );
                state.entries.remove(&stale_key);
            }
        }

        state.clock += 1;
        let clock = state.clock;
        state.entries.insert(
            key,
            CacheSlot {
                value,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> CachedAnswer {
        CachedAnswer {
            answer: text.to_string(),
            model: "test-model".to_string(),
            temperature: 0.7,
        }
    }

    #[test]
    fn key_is_idempotent() {
        let a = response_cache_key("what color is the sky?", "context", 0.7);
        let b = response_cache_key("what color is the sky?", "context", 0.7);
        assert_eq!(a, b);
    }

    #[test]
    fn key_ignores_surrounding_whitespace() {
        let a = response_cache_key("question", "context", 0.5);
        let b = response_cache_key("  question \n", "\tcontext  ", 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn key_rounds_temperature_to_three_decimals() {
        let base = response_cache_key("q", "c", 0.7);
        assert_eq!(response_cache_key("q", "c", 0.7001), base);
        assert_eq!(response_cache_key("q", "c", 0.7004), base);
        assert_ne!(response_cache_key("q", "c", 0.701), base);
    }

    #[test]
    fn key_depends_on_every_input() {
        let base = response_cache_key("q", "c", 0.7);
        assert_ne!(response_cache_key("other", "c", 0.7), base);
        assert_ne!(response_cache_key("q", "other", 0.7), base);
        assert_ne!(response_cache_key("q", "c", 0.8), base);
    }

    #[tokio::test]
    async fn get_returns_inserted_value() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.insert("key".into(), answer("cached")).await;

        let hit = cache.get("key").await.expect("expected cache hit");
        assert_eq!(hit.answer, "cached");
        assert_eq!(hit.model, "test-model");
        assert!(cache.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(10, Duration::from_millis(50));
        cache.insert("key".into(), answer("short lived")).await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("key").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn reads_do_not_extend_ttl() {
        let cache = ResponseCache::new(10, Duration::from_millis(300));
        cache.insert("key".into(), answer("value")).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get("key").await.is_some());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(cache.get("key").await.is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a".into(), answer("a")).await;
        cache.insert("b".into(), answer("b")).await;

        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").await.is_some());

        cache.insert("c".into(), answer("c")).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn overwriting_a_key_does_not_grow_the_cache() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.insert("a".into(), answer("first")).await;
        cache.insert("a".into(), answer("second")).await;

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("a").await.map(|v| v.answer), Some("second".into()));
    }
}
