//! LRU cache of sealed table blocks.
//!
//! Entries are the stored form of a block (payload plus its type byte) after
//! the checksum was verified, but before decryption. Plaintext never enters
//! the cache, so a reader holding the wrong key cannot be served decrypted
//! data that another reader produced.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a block across all open tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Cache id of the owning table (its file number)
    pub table_id: u64,
    /// Block offset in the file
    pub offset: u64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(table_id: u64, offset: u64) -> Self {
        Self { table_id, offset }
    }
}

/// A block as stored on disk, checksum already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    /// Stored payload (compressed and/or encrypted)
    pub payload: Bytes,
    /// Block type byte from the trailer
    pub block_type: u8,
}

impl SealedBlock {
    /// Bytes charged against the cache capacity
    pub fn charge(&self) -> usize {
        self.payload.len() + 1
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of insertions
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<CacheKey, (SealedBlock, u64)>,
    /// Recency tick -> key; the smallest tick is the least recently used
    order: BTreeMap<u64, CacheKey>,
    usage: usize,
    next_tick: u64,
}

impl LruState {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<SealedBlock> {
        let (block, tick) = self.entries.remove(key)?;
        self.order.remove(&tick);
        self.usage -= block.charge();
        Some(block)
    }
}

/// Thread-safe, capacity-bounded LRU cache of sealed blocks.
///
/// Shared between tables through `Arc<BlockCache>`.
#[derive(Debug)]
pub struct BlockCache {
    capacity: usize,
    state: Mutex<LruState>,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

impl BlockCache {
    /// Create a cache holding up to `capacity` bytes. Zero disables caching.
    ///
    /// ```
    /// use sealtable::cache::BlockCache;
    ///
    /// let cache = BlockCache::new(8 * 1024 * 1024);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LruState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a block, marking it most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<SealedBlock> {
        let mut state = self.state.lock();
        let tick = state.tick();
        let found = match state.entries.get_mut(key) {
            Some((block, last_used)) => {
                let old = std::mem::replace(last_used, tick);
                Some((block.clone(), old))
            }
            None => None,
        };

        match found {
            Some((block, old)) => {
                state.order.remove(&old);
                state.order.insert(tick, *key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(block)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a block, evicting least recently used entries to make room.
    ///
    /// Blocks larger than the whole cache are not stored.
    pub fn insert(&self, key: CacheKey, block: SealedBlock) {
        let charge = block.charge();
        if charge > self.capacity {
            return;
        }

        let mut state = self.state.lock();
        state.remove(&key);

        while state.usage + charge > self.capacity {
            let Some((_, victim)) = state.order.pop_first() else {
                break;
            };
            if let Some((evicted, _)) = state.entries.remove(&victim) {
                state.usage -= evicted.charge();
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let tick = state.tick();
        state.order.insert(tick, key);
        state.entries.insert(key, (block, tick));
        state.usage += charge;
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every cached block of one table.
    pub fn erase_table(&self, table_id: u64) {
        let mut state = self.state.lock();
        let keys: Vec<CacheKey> = state.entries.keys().filter(|k| k.table_id == table_id).copied().collect();
        for key in keys {
            state.remove(&key);
        }
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.usage = 0;
    }

    /// Bytes currently charged.
    pub fn size(&self) -> usize {
        self.state.lock().usage
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// A block charging exactly `size` bytes
    fn block(fill: u8, size: usize) -> SealedBlock {
        SealedBlock { payload: Bytes::from(vec![fill; size - 1]), block_type: 0x80 }
    }

    #[test]
    fn test_cache_basic_operations() {
        let cache = BlockCache::new(1024);
        let key = CacheKey::new(1, 0);

        assert_eq!(cache.get(&key), None);

        cache.insert(key, block(1, 4));
        assert_eq!(cache.get(&key), Some(block(1, 4)));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = BlockCache::new(12);
        for id in 1..=3 {
            cache.insert(CacheKey::new(id, 0), block(id as u8, 4));
        }
        assert_eq!(cache.size(), 12);

        // Touch table 1 so table 2 becomes the eviction victim
        assert!(cache.get(&CacheKey::new(1, 0)).is_some());
        cache.insert(CacheKey::new(4, 0), block(4, 4));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&CacheKey::new(1, 0)).is_some());
        assert!(cache.get(&CacheKey::new(2, 0)).is_none());
        assert!(cache.get(&CacheKey::new(3, 0)).is_some());
        assert!(cache.get(&CacheKey::new(4, 0)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_cache_replace_existing_key() {
        let cache = BlockCache::new(1024);
        let key = CacheKey::new(1, 0);

        cache.insert(key, block(1, 4));
        cache.insert(key, block(2, 6));
        assert_eq!(cache.get(&key), Some(block(2, 6)));
        assert_eq!(cache.size(), 6);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_erase_table() {
        let cache = BlockCache::new(1024);
        cache.insert(CacheKey::new(1, 0), block(1, 4));
        cache.insert(CacheKey::new(1, 100), block(1, 4));
        cache.insert(CacheKey::new(2, 0), block(2, 4));

        cache.erase_table(1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 4);
        assert!(cache.get(&CacheKey::new(2, 0)).is_some());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_cache_disabled_and_oversized() {
        let disabled = BlockCache::new(0);
        disabled.insert(CacheKey::new(1, 0), block(1, 4));
        assert!(disabled.is_empty());

        let small = BlockCache::new(10);
        small.insert(CacheKey::new(1, 0), block(1, 100));
        assert!(small.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(BlockCache::new(1024));
        let handles: Vec<_> = (0..10u64)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let key = CacheKey::new(i, 0);
                    cache.insert(key, block(i as u8, 10));
                    assert_eq!(cache.get(&key), Some(block(i as u8, 10)));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
