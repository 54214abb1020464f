//! Bounded per-pair store of dispatch and warm-start state, reused across
//! frames. Open addressing with linear probing over a prime-sized table.

use log::debug;

use super::narrowphase::{CollisionAgent, Dispatch, WarmStart};
use crate::{
    config::is_prime,
    core::shape::ShapeKind,
    error::{PhysicsError, PhysicsResult},
    utils::BodyHandle,
};

/// Unordered pair of bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: BodyHandle,
    high: BodyHandle,
}

impl PairKey {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> BodyHandle {
        self.low
    }

    pub fn high(&self) -> BodyHandle {
        self.high
    }

    pub fn involves(&self, body: BodyHandle) -> bool {
        self.low == body || self.high == body
    }

    fn hash(&self) -> u64 {
        // splitmix64 finaliser over both handles.
        let mut x = self.low.to_bits() ^ self.high.to_bits().rotate_left(29);
        x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        x ^ (x >> 31)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheEntry {
    pub key: PairKey,
    pub last_used: u64,
    pub dispatch: Dispatch,
    pub warm: WarmStart,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Inserts refused because every entry was in use this frame.
    pub saturated: u64,
}

#[derive(Debug, Clone)]
pub struct CollisionCache {
    slots: Vec<Option<CacheEntry>>,
    len: usize,
    stats: CacheStats,
}

impl CollisionCache {
    /// Creates an empty cache. `capacity` must be prime.
    pub fn with_capacity(capacity: usize) -> PhysicsResult<Self> {
        if !is_prime(capacity) {
            return Err(PhysicsError::invalid(format!(
                "collision cache capacity must be prime, got {capacity}"
            )));
        }
        Ok(Self {
            slots: vec![None; capacity],
            len: 0,
            stats: CacheStats::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.slots.iter().flatten()
    }

    fn home(&self, key: &PairKey) -> usize {
        (key.hash() % self.slots.len() as u64) as usize
    }

    fn find(&self, key: &PairKey) -> Option<usize> {
        let capacity = self.slots.len();
        let mut slot = self.home(key);
        for _ in 0..capacity {
            match &self.slots[slot] {
                None => return None,
                Some(entry) if entry.key == *key => return Some(slot),
                Some(_) => slot = (slot + 1) % capacity,
            }
        }
        None
    }

    pub fn lookup(&self, key: &PairKey) -> Option<&CacheEntry> {
        self.find(key).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn lookup_mut(&mut self, key: &PairKey) -> Option<&mut CacheEntry> {
        self.find(key).and_then(|slot| self.slots[slot].as_mut())
    }

    /// Marks the entry as used in `frame`. Returns false if the pair is not cached.
    pub fn touch(&mut self, key: &PairKey, frame: u64) -> bool {
        match self.lookup_mut(key) {
            Some(entry) => {
                entry.last_used = frame;
                true
            }
            None => false,
        }
    }

    /// Returns the pair's entry, creating it on a miss.
    ///
    /// When the table is full the oldest entry not used in `frame` is
    /// reclaimed. If every entry was used in `frame` nothing is inserted and
    /// `None` is returned; the caller then runs the pair uncached.
    pub fn get_or_insert(
        &mut self,
        key: PairKey,
        kinds: (ShapeKind, ShapeKind),
        frame: u64,
    ) -> Option<&mut CacheEntry> {
        if let Some(slot) = self.find(&key) {
            self.stats.hits += 1;
            let entry = self.slots[slot].as_mut()?;
            entry.last_used = frame;
            return Some(entry);
        }
        self.stats.misses += 1;

        if self.len == self.slots.len() && !self.reclaim_oldest(frame) {
            self.stats.saturated += 1;
            return None;
        }

        let capacity = self.slots.len();
        let mut slot = self.home(&key);
        while self.slots[slot].is_some() {
            slot = (slot + 1) % capacity;
        }
        self.slots[slot] = Some(CacheEntry {
            key,
            last_used: frame,
            dispatch: CollisionAgent::dispatch(kinds.0, kinds.1),
            warm: WarmStart::default(),
        });
        self.len += 1;
        self.slots[slot].as_mut()
    }

    fn reclaim_oldest(&mut self, frame: u64) -> bool {
        let oldest = self
            .slots
            .iter()
            .flatten()
            .filter(|entry| entry.last_used < frame)
            .min_by_key(|entry| entry.last_used)
            .map(|entry| entry.key);
        match oldest {
            Some(key) => {
                self.remove(&key);
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }

    /// Removes entries with `frame - last_used > threshold`. Returns how many went.
    pub fn evict(&mut self, frame: u64, threshold: u64) -> usize {
        let stale: Vec<PairKey> = self
            .iter()
            .filter(|entry| frame.saturating_sub(entry.last_used) > threshold)
            .map(|entry| entry.key)
            .collect();
        for key in &stale {
            self.remove(key);
        }
        self.stats.evictions += stale.len() as u64;
        if !stale.is_empty() {
            debug!("collision cache evicted {} stale pairs at frame {frame}", stale.len());
        }
        stale.len()
    }

    pub fn remove(&mut self, key: &PairKey) -> Option<CacheEntry> {
        let mut hole = self.find(key)?;
        let removed = self.slots[hole].take();
        self.len -= 1;

        // Backward-shift so that probe chains stay unbroken.
        let capacity = self.slots.len();
        let mut next = (hole + 1) % capacity;
        while let Some(entry) = self.slots[next] {
            let home = self.home(&entry.key);
            let in_between = if hole <= next {
                home > hole && home <= next
            } else {
                home > hole || home <= next
            };
            if !in_between {
                self.slots[hole] = self.slots[next].take();
                hole = next;
            }
            next = (next + 1) % capacity;
        }
        removed
    }

    /// Drops every entry that references `body`.
    pub fn remove_body(&mut self, body: BodyHandle) -> usize {
        let doomed: Vec<PairKey> = self
            .iter()
            .filter(|entry| entry.key.involves(body))
            .map(|entry| entry.key)
            .collect();
        for key in &doomed {
            self.remove(key);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
    }
}
