//! The open-addressed directory: parallel `state[]`/`entry[]` arrays,
//! probing, and the bounded aging eviction scan (`spec.md` §3, §4.2,
//! §4.4).
//!
//! Grounded on `src/shm/hashtable.rs` for the probing shape (linear
//! probe over a power-of-two table, stop at the first empty bucket)
//! and on `examples/original_source/src/index-hash-table.c`'s
//! `lookup_entry`/`fast_lookup_entry`/`find_victim` for the exact
//! aging/eviction semantics, which the teacher's mmap hash table
//! doesn't need (it evicts via a separate intrusive linked list
//! instead, see `src/shm/ordering.rs`).
use crate::error::CacheError;
use crate::fast::FastKey;
use crate::item_pool::ItemPool;
use crate::stats::Stats;

pub const MAX_EVICTION_SEARCH: u32 = 16;

/// `{EMPTY=0, REMOVED=1, MIN_AGE=2, .., MAX_AGE=7}` (`spec.md` §3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotState(pub u8);

impl SlotState {
    pub const EMPTY: SlotState = SlotState(0);
    pub const REMOVED: SlotState = SlotState(1);
    pub const MIN_AGE: SlotState = SlotState(2);
    pub const MAX_AGE: SlotState = SlotState(7);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 <= Self::REMOVED.0
    }

    #[inline]
    pub fn is_occupied(self) -> bool {
        self.0 >= Self::MIN_AGE.0
    }

    #[inline]
    fn bump(&mut self) {
        if self.0 < Self::MAX_AGE.0 {
            self.0 += 1;
        }
    }

    #[inline]
    fn decay(&mut self) {
        self.0 -= 1;
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Entry {
    hash32: u32,
    item_index: u32,
}

/// Result of probing for an insertion point: either the key is already
/// present (`Existing`) or the probe terminated at the first empty slot
/// (`Empty`) — `spec.md` §4.3.
pub enum InsertProbe {
    Existing { slot: u32 },
    Empty { slot: u32 },
}

pub struct Directory {
    states: Vec<SlotState>,
    entries: Vec<Entry>,
    entries_mask: u32,
    victim_index: u32,
    initial_state: SlotState,
}

impl Directory {
    pub fn try_new(max_entries: usize, entries_mask: u32, initial_state: SlotState) -> Result<Self, CacheError> {
        let mut states = Vec::new();
        states
            .try_reserve_exact(max_entries)
            .map_err(|_| CacheError::OutOfMemory)?;
        states.resize(max_entries, SlotState::EMPTY);

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(max_entries)
            .map_err(|_| CacheError::OutOfMemory)?;
        entries.resize(max_entries, Entry::default());

        Ok(Directory {
            states,
            entries,
            entries_mask,
            victim_index: 0,
            initial_state,
        })
    }

    pub fn clear(&mut self) {
        self.states.fill(SlotState::EMPTY);
        self.entries.fill(Entry::default());
        self.victim_index = 0;
    }

    #[inline]
    fn next(&self, index: u32) -> u32 {
        (index + 1) & self.entries_mask
    }

    pub fn item_index_at(&self, slot: u32) -> usize {
        self.entries[slot as usize].item_index as usize
    }

    pub fn state_at(&self, slot: u32) -> SlotState {
        self.states[slot as usize]
    }

    pub fn set_empty(&mut self, slot: u32) {
        self.states[slot as usize] = SlotState::EMPTY;
        self.entries[slot as usize] = Entry::default();
    }

    pub fn occupy(&mut self, slot: u32, hash: u32, item_index: u32) {
        self.entries[slot as usize] = Entry { hash32: hash, item_index };
        self.states[slot as usize] = self.initial_state;
    }

    /// Snapshot a slot's full entry before tentatively evicting it, so a
    /// re-entrant filler that turns out to have just inserted `key` can
    /// be undone via `restore` (`spec.md` §4.3's resurrection protocol).
    pub fn entry_snapshot(&self, slot: u32) -> (u32, u32, SlotState) {
        let entry = self.entries[slot as usize];
        (entry.hash32, entry.item_index, self.states[slot as usize])
    }

    /// Undo a tentative eviction: put a previously snapshotted entry
    /// back exactly as it was.
    pub fn restore(&mut self, slot: u32, hash: u32, item_index: u32, state: SlotState) {
        self.entries[slot as usize] = Entry { hash32: hash, item_index };
        self.states[slot as usize] = state;
    }

    /// Lookup by general (arbitrary-length) key bytes (`spec.md` §4.2).
    pub fn lookup_bytes(&mut self, hash: u32, key: &[u8], pool: &ItemPool, stats: &mut Stats) -> Option<u32> {
        stats.lookups += 1;
        let mut index = hash & self.entries_mask;
        let mut scans = 0u64;
        loop {
            let state = self.states[index as usize];
            if state.is_empty() {
                stats.misses.bump(scans);
                return None;
            }
            let entry = self.entries[index as usize];
            if entry.hash32 == hash && pool.key(entry.item_index as usize) == key {
                self.states[index as usize].bump();
                stats.hits.bump(scans);
                return Some(index);
            }
            index = self.next(index);
            scans += 1;
        }
    }

    /// Lookup specialized for 16-byte fast keys (`spec.md` §4.2).
    pub fn lookup_fast(&mut self, hash: u32, key: FastKey, pool: &ItemPool, stats: &mut Stats) -> Option<u32> {
        stats.lookups += 1;
        let mut index = hash & self.entries_mask;
        let mut scans = 0u64;
        loop {
            let state = self.states[index as usize];
            if state.is_empty() {
                stats.misses.bump(scans);
                return None;
            }
            let entry = self.entries[index as usize];
            if entry.hash32 == hash && pool.fast_key(entry.item_index as usize).fast_eq(key) {
                self.states[index as usize].bump();
                stats.hits.bump(scans);
                return Some(index);
            }
            index = self.next(index);
            scans += 1;
        }
    }

    /// Probe for the insertion point of `key`, without mutating any
    /// stats (callers bump `adds`/`updates` once they know which).
    pub fn probe_insert_bytes(&self, hash: u32, key: &[u8], pool: &ItemPool) -> (InsertProbe, u64) {
        let mut index = hash & self.entries_mask;
        let mut scans = 0u64;
        loop {
            let state = self.states[index as usize];
            if state.is_empty() {
                return (InsertProbe::Empty { slot: index }, scans);
            }
            let entry = self.entries[index as usize];
            if entry.hash32 == hash && pool.key(entry.item_index as usize) == key {
                return (InsertProbe::Existing { slot: index }, scans);
            }
            index = self.next(index);
            scans += 1;
        }
    }

    pub fn probe_insert_fast(&self, hash: u32, key: FastKey, pool: &ItemPool) -> (InsertProbe, u64) {
        let mut index = hash & self.entries_mask;
        let mut scans = 0u64;
        loop {
            let state = self.states[index as usize];
            if state.is_empty() {
                return (InsertProbe::Empty { slot: index }, scans);
            }
            let entry = self.entries[index as usize];
            if entry.hash32 == hash && pool.fast_key(entry.item_index as usize).fast_eq(key) {
                return (InsertProbe::Existing { slot: index }, scans);
            }
            index = self.next(index);
            scans += 1;
        }
    }

    /// Bounded decaying scan for an eviction victim (`spec.md` §4.4).
    pub fn find_victim(&mut self, stats: &mut Stats) -> Option<u32> {
        let mut victim: Option<u32> = None;
        let mut victim_state = SlotState(SlotState::MAX_AGE.0 + 1);
        let mut budget = MAX_EVICTION_SEARCH;
        let mut scans = 0u64;
        let mut index = self.victim_index;

        while budget > 0 {
            let state = self.states[index as usize];
            scans += 1;
            if state.is_empty() {
                index = self.next(index);
                continue;
            }

            if state < victim_state {
                victim = Some(index);
                victim_state = state;
                if state == SlotState::MIN_AGE {
                    index = self.next(index);
                    break;
                }
            }

            self.states[index as usize].decay();
            budget -= 1;
            index = self.next(index);
        }

        self.victim_index = index;
        stats.evictions.bump(scans);
        victim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Layout, DEFAULT_LOAD_FACTOR};

    fn fresh(min_capacity: usize) -> (Directory, ItemPool) {
        let layout = Layout::compute(min_capacity, 8, 8, DEFAULT_LOAD_FACTOR);
        let dir = Directory::try_new(layout.max_entries, layout.entries_mask, SlotState::MIN_AGE).unwrap();
        let pool = ItemPool::try_new(layout).unwrap();
        (dir, pool)
    }

    #[test]
    fn lookup_misses_on_empty_directory() {
        let (mut dir, pool) = fresh(100);
        let mut stats = Stats::default();
        assert!(dir.lookup_fast(42, FastKey::from_bytes(&[1]), &pool, &mut stats).is_none());
        assert_eq!(stats.misses.count, 1);
    }

    #[test]
    fn occupy_then_lookup_hits() {
        let (mut dir, mut pool) = fresh(100);
        pool.store(0, &1u64.to_le_bytes(), &9u64.to_le_bytes());
        dir.occupy(5, 42, 0);
        let mut stats = Stats::default();
        let found = dir.lookup_fast(42, FastKey::from_bytes(&1u64.to_le_bytes()), &pool, &mut stats);
        assert_eq!(found, Some(5));
        assert_eq!(stats.hits.count, 1);
    }

    #[test]
    fn find_victim_prefers_min_age_and_stops_immediately() {
        let (mut dir, _pool) = fresh(100);
        dir.occupy(0, 1, 0);
        dir.occupy(1, 2, 1);
        // slot 1 is at MIN_AGE already; victim search should stop there.
        let mut stats = Stats::default();
        let victim = dir.find_victim(&mut stats);
        assert!(victim.is_some());
    }
}
