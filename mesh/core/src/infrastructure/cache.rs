// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bounded Cache
//!
//! LRU cache with per-entry absolute expiry. Expiry is lazy: a stale entry is
//! only removed when a `get` touches it. Eviction order is pure recency and
//! ignores TTL.
//!
//! The cache is a plain single-mutator structure. Services that share one
//! across tasks wrap it in a `parking_lot::Mutex`.

use std::hash::Hash;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::mesh_config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub max_size: usize,
    pub default_ttl_ms: i64,
}

impl From<CacheConfig> for CacheOptions {
    fn from(config: CacheConfig) -> Self {
        Self {
            max_size: config.max_size,
            default_ttl_ms: config.default_ttl_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: i64,
}

pub struct BoundedCache<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    max_size: usize,
    default_ttl_ms: i64,
    stats: CacheStats,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_size: options.max_size,
            default_ttl_ms: options.default_ttl_ms,
            stats: CacheStats::default(),
        }
    }

    /// Returns the live value and promotes it to most recently used.
    /// Absent and expired keys count as misses; an expired entry is dropped.
    pub fn get(&mut self, key: &K, now: i64) -> Option<V> {
        let expired = match self.entries.peek(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at <= now,
        };

        if expired {
            self.entries.pop(key);
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&mut self, key: K, value: V, ttl_ms: Option<i64>, now: i64) {
        let ttl_ms = ttl_ms.unwrap_or(self.default_ttl_ms);
        self.stats.sets += 1;
        self.entries.put(
            key,
            CacheEntry {
                value,
                expires_at: now.saturating_add(ttl_ms),
            },
        );
        self.trim();
    }

    pub fn delete(&mut self, key: &K) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    /// Stored entries, expired ones included until touched.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn trim(&mut self) {
        while self.entries.len() > self.max_size {
            if self.entries.pop_lru().is_none() {
                break;
            }
            self.stats.evictions += 1;
            debug!(max_size = self.max_size, "Evicted least recently used cache entry");
        }
    }
}
