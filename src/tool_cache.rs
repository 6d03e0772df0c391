//! Time-boxed memoization of tool results.
//!
//! Stale entries are never served: age is checked on every read. Removal is left
//! to the reaper so reads stay lock-light.

use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use crate::reaper::Sweep;

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    written_at: Instant,
}

pub struct ToolCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ToolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// `"{tool}:{args}"` with object keys sorted so equal arguments always map to
    /// the same key regardless of the order the model emitted them in.
    pub fn cache_key(tool_name: &str, args: &Value) -> String {
        format!("{}:{}", tool_name, canonical_json(args))
    }

    pub fn get(&self, tool_name: &str, args: &Value) -> Option<Value> {
        let key = Self::cache_key(tool_name, args);
        let entry = self.entries.get(&key)?;
        if entry.written_at.elapsed() < self.ttl {
            Some(entry.data.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, tool_name: &str, args: &Value, data: Value) {
        self.entries.insert(
            Self::cache_key(tool_name, args),
            CacheEntry {
                data,
                written_at: Instant::now(),
            },
        );
    }

    /// Returns the cached result for `(tool_name, args)` or runs `compute` and
    /// stores its successful output. Failures are returned as-is and not cached.
    ///
    /// Two concurrent misses for the same key both run `compute`.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        tool_name: &str,
        args: &Value,
        compute: F,
    ) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(hit) = self.get(tool_name, args) {
            trace!("Tool cache hit for {}", tool_name);
            return Ok(hit);
        }

        trace!("Tool cache miss for {}", tool_name);
        let data = compute().await?;
        self.insert(tool_name, args, data.clone());
        Ok(data)
    }
}

impl Sweep for ToolCache {
    fn name(&self) -> &'static str {
        "tool_cache"
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.written_at) < ttl);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    async fn lookup(cache: &ToolCache, calls: &AtomicUsize, args: &Value) -> Value {
        cache
            .get_or_compute("getWebSearch", args, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, String>(json!({ "call": n }))
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_cache_key_ignores_argument_order() {
        let a = json!({"query": "rust", "count": 5, "nested": {"b": 1, "a": [2, {"y": 1, "x": 0}]}});
        let b = json!({"nested": {"a": [2, {"x": 0, "y": 1}], "b": 1}, "count": 5, "query": "rust"});
        assert_eq!(ToolCache::cache_key("t", &a), ToolCache::cache_key("t", &b));
        assert_ne!(
            ToolCache::cache_key("t", &a),
            ToolCache::cache_key("other", &a)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_calls_within_ttl_hit_cache() {
        let cache = ToolCache::new(TTL);
        let calls = AtomicUsize::new(0);
        let args = json!({"query": "rust async"});

        let first = lookup(&cache, &calls, &args).await;
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = lookup(&cache, &calls, &args).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_recomputed() {
        let cache = ToolCache::new(TTL);
        let calls = AtomicUsize::new(0);
        let args = json!({"query": "rust async"});

        lookup(&cache, &calls, &args).await;
        tokio::time::advance(Duration::from_secs(301)).await;

        assert!(cache.get("getWebSearch", &args).is_none());
        let refreshed = lookup(&cache, &calls, &args).await;

        assert_eq!(refreshed, json!({"call": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let cache = ToolCache::new(TTL);
        let args = json!({});

        let err = cache
            .get_or_compute("getSkills", &args, || async {
                Err::<Value, _>("boom".to_string())
            })
            .await;
        assert!(err.is_err());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_stale_entries() {
        let cache = ToolCache::new(TTL);
        cache.insert("getMe", &json!({"query": "hi"}), json!("old"));
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.insert("getSkills", &json!({}), json!("new"));
        tokio::time::advance(Duration::from_secs(101)).await;

        assert_eq!(cache.sweep(Instant::now()), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("getSkills", &json!({})).is_some());
    }
}
