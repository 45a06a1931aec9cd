//! Bounded cache of generated avatar URLs.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

type CacheKey = (String, String);

struct CachedUrl {
    url: String,
    inserted_at: Instant,
}

/// Avatar URLs keyed by `(style, seed)`, expiring after `ttl` and evicting
/// the oldest entry once `capacity` is reached.
pub struct AvatarCache {
    capacity: usize,
    ttl: Duration,
    // insertion order is also expiry order
    entries: IndexMap<CacheKey, CachedUrl>,
}

impl AvatarCache {
    /// Empty cache. A zero capacity disables caching.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Cached URL, or the one produced by `build` which is then stored.
    /// Nothing is stored when `build` fails.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        style: &str,
        seed: &str,
        now: Instant,
        build: impl FnOnce() -> Result<String, E>,
    ) -> Result<String, E> {
        let key = (style.to_string(), seed.to_string());
        if let Some(cached) = self.entries.get(&key) {
            if !self.is_expired(cached, now) {
                return Ok(cached.url.clone());
            }
            self.entries.shift_remove(&key);
        }

        let url = build()?;
        if self.capacity == 0 {
            return Ok(url);
        }

        self.purge_expired(now);
        while self.entries.len() >= self.capacity {
            if self.entries.shift_remove_index(0).is_none() {
                break;
            }
        }

        self.entries.insert(
            key,
            CachedUrl {
                url: url.clone(),
                inserted_at: now,
            },
        );
        Ok(url)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, cached: &CachedUrl, now: Instant) -> bool {
        now.saturating_duration_since(cached.inserted_at) >= self.ttl
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some((_, oldest)) = self.entries.first() {
            if !self.is_expired(oldest, now) {
                break;
            }
            self.entries.shift_remove_index(0);
        }
    }
}
