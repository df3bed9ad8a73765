//! Relay record store.
//!
//! Maps a client identity to its latest [`DhcpRecord`]. Records are shared
//! as immutable snapshots; a write replaces the whole value. The map is
//! split into shards so traffic for different clients rarely contends on
//! the same lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

use crate::domain::{DhcpRecord, HostId};

const MIN_SHARDS: usize = 16;
const SHARDS_PER_THREAD: usize = 4;

type Shard = RwLock<HashMap<HostId, Arc<DhcpRecord>>>;

/// Sharded map of relay records.
///
/// Identities in different shards never block each other. Two identities
/// that hash to the same shard share its lock, so a `put` for one briefly
/// holds off a `get` for the other; the lock only covers a map insert or
/// lookup, never packet handling. The shard count grows with the number of
/// worker threads to keep such collisions rare.
pub struct DhcpRelayStore {
    shards: Vec<Shard>,
}

impl DhcpRelayStore {
    pub fn new() -> Self {
        let threads = thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_shards(threads * SHARDS_PER_THREAD)
    }

    /// A store with at least `count` shards, rounded up to a power of two.
    pub fn with_shards(count: usize) -> Self {
        let count = count.max(MIN_SHARDS).next_power_of_two();
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard(&self, id: &HostId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }

    /// Snapshot of the record for `id`.
    pub fn get(&self, id: &HostId) -> Option<Arc<DhcpRecord>> {
        self.shard(id)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Replace the record for `id`. Concurrent writers for one identity
    /// resolve last-write-wins.
    pub fn put(&self, id: HostId, record: DhcpRecord) {
        self.shard(&id)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(record));
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<Arc<DhcpRecord>> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DhcpRelayStore {
    fn default() -> Self {
        Self::new()
    }
}
