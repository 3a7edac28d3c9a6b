//! Smart cache engine: hash table + LRU + TTL + stats (§4.7).
//!
//! Entries live in a `Vec<Slot>` slab; buckets and the LRU list are threaded
//! through the slab by index rather than by pointer, so the whole structure
//! is safe Rust with no unsafe blocks. A single [`platform::RwLock`] guards
//! both the bucket table and the LRU list — `get` takes a read lock for the
//! hash lookup and, only on a live hit that needs to touch LRU order or
//! counters, drops it and re-acquires a write lock (the "upgrade via
//! drop-and-reacquire" the spec calls for). Readers may therefore observe a
//! slightly stale LRU position under contention, never a torn entry.

use std::time::Duration;

use crate::config::CacheConfig;
use crate::platform::{self, AtomicU64, AtomicUsize, Ordering, RwLock};

/// FNV-1a hash over raw bytes, used for both bucket placement and the
/// `key_hash` field stored on each entry (§3 "CacheEntry").
pub fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Builds a cache key for a request, mirroring the spec's
/// `generate_key(method, path, query, headers_hash, buf)` signature by
/// writing the composed key into `buf` and returning it.
pub fn generate_key<'a>(
    method: &str,
    path: &str,
    query: &str,
    headers_hash: u32,
    buf: &'a mut String,
) -> &'a str {
    buf.clear();
    buf.push_str(method);
    buf.push('|');
    buf.push_str(path);
    buf.push('|');
    buf.push_str(query);
    buf.push('|');
    buf.push_str(&format!("{:x}", headers_hash));
    buf.as_str()
}

const NIL: usize = usize::MAX;

struct Slot {
    key: Box<[u8]>,
    key_hash: u32,
    value: Box<[u8]>,
    created_at_ms: u64,
    expires_at_ms: Option<u64>,
    access_count: u64,
    last_access_ms: u64,
    lru_prev: usize,
    lru_next: usize,
    next_in_bucket: usize,
    occupied: bool,
}

struct Inner {
    buckets: Vec<usize>,
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    lru_head: usize,
    lru_tail: usize,
    len: usize,
    capacity: usize,
}

impl Inner {
    fn new(bucket_count: usize, capacity: usize) -> Self {
        Self {
            buckets: vec![NIL; bucket_count.max(1)],
            slots: Vec::new(),
            free_list: Vec::new(),
            lru_head: NIL,
            lru_tail: NIL,
            len: 0,
            capacity,
        }
    }

    fn bucket_index(&self, hash: u32) -> usize {
        (hash as usize) % self.buckets.len()
    }

    fn find(&self, bucket: usize, key: &[u8]) -> Option<usize> {
        let mut cur = self.buckets[bucket];
        while cur != NIL {
            let slot = &self.slots[cur];
            if slot.occupied && &*slot.key == key {
                return Some(cur);
            }
            cur = slot.next_in_bucket;
        }
        None
    }

    fn lru_detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].lru_prev, self.slots[idx].lru_next);
        if prev != NIL {
            self.slots[prev].lru_next = next;
        } else {
            self.lru_head = next;
        }
        if next != NIL {
            self.slots[next].lru_prev = prev;
        } else {
            self.lru_tail = prev;
        }
        self.slots[idx].lru_prev = NIL;
        self.slots[idx].lru_next = NIL;
    }

    fn lru_push_front(&mut self, idx: usize) {
        self.slots[idx].lru_prev = NIL;
        self.slots[idx].lru_next = self.lru_head;
        if self.lru_head != NIL {
            self.slots[self.lru_head].lru_prev = idx;
        }
        self.lru_head = idx;
        if self.lru_tail == NIL {
            self.lru_tail = idx;
        }
    }

    fn lru_promote(&mut self, idx: usize) {
        if self.lru_head == idx {
            return;
        }
        self.lru_detach(idx);
        self.lru_push_front(idx);
    }

    fn bucket_remove(&mut self, bucket: usize, idx: usize) {
        let mut cur = self.buckets[bucket];
        if cur == idx {
            self.buckets[bucket] = self.slots[idx].next_in_bucket;
            return;
        }
        while cur != NIL {
            let next = self.slots[cur].next_in_bucket;
            if next == idx {
                self.slots[cur].next_in_bucket = self.slots[idx].next_in_bucket;
                return;
            }
            cur = next;
        }
    }

    fn remove_entry(&mut self, idx: usize) -> (usize, usize) {
        let key_len = self.slots[idx].key.len();
        let val_len = self.slots[idx].value.len();
        let bucket = self.bucket_index(self.slots[idx].key_hash);
        self.bucket_remove(bucket, idx);
        self.lru_detach(idx);
        self.slots[idx].occupied = false;
        self.slots[idx].key = Box::new([]);
        self.slots[idx].value = Box::new([]);
        self.free_list.push(idx);
        self.len -= 1;
        (key_len, val_len)
    }

    fn evict_lru(&mut self) -> Option<(usize, usize)> {
        if self.lru_tail == NIL {
            return None;
        }
        let idx = self.lru_tail;
        Some(self.remove_entry(idx))
    }
}

/// Aggregate, process-global cache statistics (§4.7, §9 "Global mutable
/// state" — created with the cache and read via atomics with no lock).
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expirations: AtomicU64,
    pub sets: AtomicU64,
    pub memory_bytes: AtomicUsize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        let total = hits + misses;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub sets: u64,
    pub memory_bytes: usize,
    pub hit_ratio: f64,
}

/// Per-entry allocation overhead counted towards `memory_usage` (§4.7
/// invariant: `memory_usage ≈ Σ(key_len + value_len + entry_overhead)`).
const ENTRY_OVERHEAD: usize = 64;

/// The smart cache: an in-process hash+LRU table with TTL eviction.
pub struct Cache {
    inner: RwLock<Inner>,
    stats: CacheStats,
    default_ttl: Option<Duration>,
    clock: platform::Clock,
}

impl Cache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::new(config.bucket_count, config.capacity)),
            stats: CacheStats::default(),
            default_ttl: config.default_ttl,
            clock: platform::Clock::new(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn configure(&mut self, config: &CacheConfig) {
        let mut inner = self.inner.write();
        *inner = Inner::new(config.bucket_count, config.capacity);
        self.default_ttl = config.default_ttl;
    }

    /// Changes capacity in place, evicting LRU entries if the new capacity
    /// is smaller than the current size. Bucket layout is unchanged.
    pub fn resize(&self, new_capacity: usize) {
        let mut inner = self.inner.write();
        inner.capacity = new_capacity;
        while inner.len > inner.capacity {
            if let Some((k, v)) = inner.evict_lru() {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .memory_bytes
                    .fetch_sub(k + v + ENTRY_OVERHEAD, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    /// `get(key) -> {found, bytes}` (§4.7).
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let hash = fnv1a(key);
        {
            let inner = self.inner.read();
            let bucket = inner.bucket_index(hash);
            if let Some(idx) = inner.find(bucket, key) {
                let slot = &inner.slots[idx];
                let now = self.clock.now_ms();
                let expired = slot.expires_at_ms.is_some_and(|exp| now >= exp);
                if !expired {
                    let value = slot.value.to_vec();
                    drop(inner);
                    self.promote_hit(hash, key);
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
            }
        }
        // Either a miss, or an expired entry that needs removing under a
        // write lock (upgrade via drop-and-reacquire).
        self.remove_if_expired(hash, key);
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn promote_hit(&self, hash: u32, key: &[u8]) {
        let mut inner = self.inner.write();
        let bucket = inner.bucket_index(hash);
        if let Some(idx) = inner.find(bucket, key) {
            inner.lru_promote(idx);
            inner.slots[idx].access_count += 1;
            inner.slots[idx].last_access_ms = self.clock.now_ms();
        }
    }

    fn remove_if_expired(&self, hash: u32, key: &[u8]) {
        let mut inner = self.inner.write();
        let bucket = inner.bucket_index(hash);
        if let Some(idx) = inner.find(bucket, key) {
            let now = self.clock.now_ms();
            if inner.slots[idx].expires_at_ms.is_some_and(|exp| now >= exp) {
                let (k, v) = inner.remove_entry(idx);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .memory_bytes
                    .fetch_sub(k + v + ENTRY_OVERHEAD, Ordering::Relaxed);
            }
        }
    }

    /// `set(key, bytes, ttl_s)` (§4.7). `ttl` of `None` falls back to the
    /// cache's configured default TTL; `Some(Duration::ZERO)` means no
    /// expiry.
    pub fn set(&self, key: &[u8], value: &[u8], ttl: Option<Duration>) {
        let hash = fnv1a(key);
        let ttl = ttl.or(self.default_ttl);
        let now = self.clock.now_ms();
        let expires_at_ms = match ttl {
            Some(d) if !d.is_zero() => Some(now + d.as_millis() as u64),
            _ => None,
        };

        let mut inner = self.inner.write();
        let bucket = inner.bucket_index(hash);

        if let Some(idx) = inner.find(bucket, key) {
            let old_len = inner.slots[idx].value.len();
            inner.slots[idx].value = value.to_vec().into_boxed_slice();
            inner.slots[idx].created_at_ms = now;
            inner.slots[idx].expires_at_ms = expires_at_ms;
            inner.slots[idx].last_access_ms = now;
            inner.lru_promote(idx);
            let new_len = inner.slots[idx].value.len();
            if new_len >= old_len {
                self.stats
                    .memory_bytes
                    .fetch_add(new_len - old_len, Ordering::Relaxed);
            } else {
                self.stats
                    .memory_bytes
                    .fetch_sub(old_len - new_len, Ordering::Relaxed);
            }
            self.stats.sets.fetch_add(1, Ordering::Relaxed);
            return;
        }

        while inner.len >= inner.capacity && inner.capacity > 0 {
            match inner.evict_lru() {
                Some((k, v)) => {
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .memory_bytes
                        .fetch_sub(k + v + ENTRY_OVERHEAD, Ordering::Relaxed);
                }
                None => break,
            }
        }

        let idx = match inner.free_list.pop() {
            Some(idx) => idx,
            None => {
                inner.slots.push(Slot {
                    key: Box::new([]),
                    key_hash: 0,
                    value: Box::new([]),
                    created_at_ms: 0,
                    expires_at_ms: None,
                    access_count: 0,
                    last_access_ms: 0,
                    lru_prev: NIL,
                    lru_next: NIL,
                    next_in_bucket: NIL,
                    occupied: false,
                });
                inner.slots.len() - 1
            }
        };

        let key_len = key.len();
        let val_len = value.len();
        inner.slots[idx] = Slot {
            key: key.to_vec().into_boxed_slice(),
            key_hash: hash,
            value: value.to_vec().into_boxed_slice(),
            created_at_ms: now,
            expires_at_ms,
            access_count: 0,
            last_access_ms: now,
            lru_prev: NIL,
            lru_next: NIL,
            next_in_bucket: inner.buckets[bucket],
            occupied: true,
        };
        inner.buckets[bucket] = idx;
        inner.lru_push_front(idx);
        inner.len += 1;

        self.stats
            .memory_bytes
            .fetch_add(key_len + val_len + ENTRY_OVERHEAD, Ordering::Relaxed);
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete(&self, key: &[u8]) -> bool {
        let hash = fnv1a(key);
        let mut inner = self.inner.write();
        let bucket = inner.bucket_index(hash);
        if let Some(idx) = inner.find(bucket, key) {
            let (k, v) = inner.remove_entry(idx);
            self.stats
                .memory_bytes
                .fetch_sub(k + v + ENTRY_OVERHEAD, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        let hash = fnv1a(key);
        let inner = self.inner.read();
        let bucket = inner.bucket_index(hash);
        inner
            .find(bucket, key)
            .map(|idx| {
                let now = self.clock.now_ms();
                !inner.slots[idx]
                    .expires_at_ms
                    .is_some_and(|exp| now >= exp)
            })
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let bucket_count = inner.buckets.len();
        let capacity = inner.capacity;
        *inner = Inner::new(bucket_count, capacity);
        self.stats.memory_bytes.store(0, Ordering::Relaxed);
    }

    /// Sweeps all entries and evicts expired ones. Returns the count
    /// removed. Intended to be called periodically by an external driver
    /// (not a background thread owned by the cache itself).
    pub fn expire_entries(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.write();
        let expired: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.occupied && slot.expires_at_ms.is_some_and(|exp| now >= exp)
            })
            .map(|(idx, _)| idx)
            .collect();
        let count = expired.len();
        for idx in expired {
            let (k, v) = inner.remove_entry(idx);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            self.stats
                .memory_bytes
                .fetch_sub(k + v + ENTRY_OVERHEAD, Ordering::Relaxed);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize) -> Cache {
        Cache::new(&CacheConfig {
            capacity,
            default_ttl: None,
            bucket_count: 8,
        })
    }

    #[test]
    fn set_then_get_within_ttl() {
        let c = cache(10);
        c.set(b"k", b"v", Some(Duration::from_secs(60)));
        assert_eq!(c.get(b"k"), Some(b"v".to_vec()));
        assert_eq!(c.stats().hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn get_miss_increments_misses() {
        let c = cache(10);
        assert_eq!(c.get(b"missing"), None);
        assert_eq!(c.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn expired_entry_reports_miss_and_counts_expiration() {
        let c = cache(10);
        c.set(b"k", b"v", Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(c.get(b"k"), None);
        assert_eq!(c.stats().expirations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn set_on_existing_key_replaces_value_and_promotes_lru() {
        let c = cache(2);
        c.set(b"a", b"1", None);
        c.set(b"b", b"2", None);
        c.set(b"a", b"11", None);
        // a was just touched, so evicting once more should drop b, not a.
        c.set(b"c", b"3", None);
        assert_eq!(c.get(b"a"), Some(b"11".to_vec()));
        assert_eq!(c.get(b"b"), None);
        assert_eq!(c.get(b"c"), Some(b"3".to_vec()));
    }

    /// Scenario S4 from spec §8.
    #[test]
    fn scenario_s4_lru_eviction_order() {
        let c = cache(2);
        c.set(b"a", b"1", Some(Duration::from_secs(60)));
        c.set(b"b", b"2", Some(Duration::from_secs(60)));
        c.get(b"a");
        c.set(b"c", b"3", Some(Duration::from_secs(60)));

        assert_eq!(c.get(b"b"), None);
        assert_eq!(c.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(c.get(b"c"), Some(b"3".to_vec()));
    }

    #[test]
    fn delete_removes_entry() {
        let c = cache(10);
        c.set(b"k", b"v", None);
        assert!(c.delete(b"k"));
        assert!(!c.exists(b"k"));
        assert!(!c.delete(b"k"));
    }

    #[test]
    fn fnv1a_matches_known_vector() {
        // FNV-1a of the empty string is the offset basis.
        assert_eq!(fnv1a(b""), 0x811c9dc5);
    }

    #[test]
    fn clear_resets_stats_memory() {
        let c = cache(10);
        c.set(b"k", b"v", None);
        c.clear();
        assert_eq!(c.len(), 0);
        assert_eq!(c.stats().memory_bytes.load(Ordering::Relaxed), 0);
    }
}
