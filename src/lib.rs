//! Bounded, single-owner indexed hash cache with aging-based eviction.
//!
//! The directory (`directory::Directory`) holds 8-bit occupancy/age
//! tags and open-addressed probing; the item pool (`item_pool::ItemPool`)
//! holds the packed `(key, value)` bytes. [`Cache`] wires these together
//! with a caller-supplied filler closure for compute-on-miss and a
//! value-destroyer closure run over every occupied slot on
//! [`Cache::remove_all`]/[`Cache::reconfigure`]/drop.
//!
//! Grounded on `src/shm/mod.rs`'s `ShmCache` (same method shape —
//! `get`/`insert`/`clear`/`info` — minus the cross-process lock and mmap
//! indirection).
pub mod directory;
pub mod error;
pub mod fast;
pub mod hash;
pub mod item_pool;
pub mod layout;
pub mod stats;

use directory::{Directory, InsertProbe, SlotState};
use error::{CacheError, FetchError};
use fast::{FastKey, FastValue};
use hash::{hash32_bytes, hash32_fast};
use item_pool::ItemPool;
use layout::{Layout, DEFAULT_LOAD_FACTOR};
use stats::{Stats, StatsDetail};

pub use directory::MAX_EVICTION_SEARCH;
pub use layout::MIN_CAPACITY;

type Filler = Box<dyn FnMut(&[u8], &mut [u8]) -> bool>;
type ValueDestroyer = Box<dyn FnMut(&[u8])>;

/// A bounded associative cache over fixed-size keys and values.
///
/// Not `Send`/`Sync`: the filler and value-destroyer closures may hold
/// non-thread-safe state, and there is no internal locking (unlike the
/// teacher's `ShmCache`, which is cross-process and does need one).
pub struct Cache {
    min_capacity: usize,
    key_size: usize,
    value_size: usize,
    max_load_factor: f64,
    initial_state: SlotState,

    layout: Layout,
    directory: Directory,
    items: ItemPool,
    item_count: usize,

    filler: Option<Filler>,
    value_destroyer: Option<ValueDestroyer>,
    na_value: Vec<u8>,

    stats: Stats,
}

impl Cache {
    /// Creates a cache sized for at least `min_capacity` live entries.
    ///
    /// `key_size`/`value_size` are fixed for the cache's lifetime; they
    /// are not among the fields a [`Cache::reconfigure`] can change.
    pub fn new(min_capacity: usize, key_size: usize, value_size: usize) -> Result<Self, CacheError> {
        if key_size == 0 {
            tracing::debug!("cache construction rejected: key_size == 0");
            return Err(CacheError::InvalidKeySize);
        }
        if value_size == 0 {
            tracing::debug!("cache construction rejected: value_size == 0");
            return Err(CacheError::InvalidValueSize);
        }

        let max_load_factor = DEFAULT_LOAD_FACTOR;
        let initial_state = SlotState::MIN_AGE;
        let (layout, directory, items) =
            Self::build(min_capacity, key_size, value_size, max_load_factor, initial_state)?;
        let na_size = if layout.fast_value { FastKey::SIZE } else { value_size };

        Ok(Cache {
            min_capacity,
            key_size,
            value_size,
            max_load_factor,
            initial_state,
            layout,
            directory,
            items,
            item_count: 0,
            filler: None,
            value_destroyer: None,
            na_value: vec![0u8; na_size],
            stats: Stats::default(),
        })
    }

    fn build(
        min_capacity: usize,
        key_size: usize,
        value_size: usize,
        max_load_factor: f64,
        initial_state: SlotState,
    ) -> Result<(Layout, Directory, ItemPool), CacheError> {
        let layout = Layout::compute(min_capacity, key_size, value_size, max_load_factor);
        let directory = Directory::try_new(layout.max_entries, layout.entries_mask, initial_state)?;
        let items = ItemPool::try_new(layout)?;
        Ok((layout, directory, items))
    }

    /// Registers the compute-on-miss closure used by [`Cache::fetch`],
    /// [`Cache::get`], [`Cache::get_fast`], and [`Cache::get_fast_f64`].
    pub fn set_filler(&mut self, filler: impl FnMut(&[u8], &mut [u8]) -> bool + 'static) {
        self.filler = Some(Box::new(filler));
    }

    /// Registers a closure run over every occupied slot's value bytes on
    /// [`Cache::remove_all`], [`Cache::reconfigure`], and drop.
    ///
    /// Not called on an ordinary eviction — the evicted slot's bytes are
    /// simply overwritten by the next insert, not freed, so there is
    /// nothing to destroy until the whole table is torn down.
    pub fn set_value_destroyer(&mut self, destroyer: impl FnMut(&[u8]) + 'static) {
        self.value_destroyer = Some(Box::new(destroyer));
    }

    /// Sets the value returned by [`Cache::get_fast`]/[`Cache::get_fast_f64`]
    /// when there is no filler, or the filler fails. `None` zeroes it.
    pub fn set_na_value(&mut self, na_value: Option<&[u8]>) {
        match na_value {
            Some(bytes) => {
                debug_assert_eq!(bytes.len(), self.value_size);
                self.na_value[..self.value_size].copy_from_slice(bytes);
            }
            None => self.na_value[..self.value_size].fill(0),
        }
    }

    /// Takes effect on the next [`Cache::reconfigure`].
    pub fn set_max_load_factor(&mut self, max_load_factor: f64) {
        self.max_load_factor = max_load_factor;
    }

    /// Takes effect on the next [`Cache::reconfigure`].
    pub fn set_min_capacity(&mut self, min_capacity: usize) {
        self.min_capacity = min_capacity;
    }

    pub fn has_filler(&self) -> bool {
        self.filler.is_some()
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn max_items(&self) -> usize {
        self.layout.max_items
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    /// Rebuilds the directory and item pool empty, from the current
    /// `min_capacity`/`max_load_factor`. Does not rehash live entries —
    /// `spec.md`'s Non-goals rule out resizing without a flush.
    pub fn reconfigure(&mut self) -> Result<(), CacheError> {
        tracing::debug!(
            min_capacity = self.min_capacity,
            max_load_factor = self.max_load_factor,
            "reconfiguring cache"
        );
        self.remove_all();
        let (layout, directory, items) = Self::build(
            self.min_capacity,
            self.key_size,
            self.value_size,
            self.max_load_factor,
            self.initial_state,
        )?;
        self.layout = layout;
        self.directory = directory;
        self.items = items;
        self.item_count = 0;
        Ok(())
    }

    /// Runs the value-destroyer (if any) over every occupied slot, then
    /// empties the directory and item pool.
    pub fn remove_all(&mut self) {
        if self.value_destroyer.is_some() {
            let max_entries = self.layout.max_entries as u32;
            for slot in 0..max_entries {
                if self.directory.state_at(slot).is_occupied() {
                    let item_index = self.directory.item_index_at(slot);
                    if let Some(destroyer) = self.value_destroyer.as_mut() {
                        destroyer(self.items.value(item_index));
                    }
                }
            }
        }
        self.directory.clear();
        self.items.clear();
        self.item_count = 0;
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn print_stats(
        &self,
        sink: &mut impl std::io::Write,
        label: &str,
        indent: usize,
        detail: StatsDetail,
    ) -> std::io::Result<()> {
        self.stats.print(sink, label, indent, detail)
    }

    /// Hashes a key according to its representation: 16 bytes or fewer
    /// use the fast path (hardware CRC32C when available), longer keys
    /// use the general software mix (`spec.md` §4.1).
    fn hash_key(&self, key: &[u8]) -> u32 {
        if self.layout.fast_key {
            hash32_fast(FastKey::from_bytes(key))
        } else {
            hash32_bytes(key)
        }
    }

    fn fill_value(&mut self, key: &[u8]) -> Result<Vec<u8>, FetchError> {
        let mut filler = self.filler.take().ok_or(FetchError::NoProducer)?;
        let mut value = vec![0u8; self.value_size];
        let produced = filler(key, &mut value);
        self.filler = Some(filler);
        if produced {
            Ok(value)
        } else {
            Err(FetchError::ProducerFailed)
        }
    }

    /// The tentative-eviction / resurrection protocol of `spec.md` §4.3:
    /// when the pool is full, a victim slot is snapshotted and freed
    /// before the insertion probe runs, then restored if the probe
    /// discovers `key` was already present.
    fn alloc_new_entry_bytes(&mut self, key: &[u8], hash: u32) -> (usize, bool) {
        let mut victim: Option<(u32, u32, u32, SlotState)> = None;
        let mut new_item_index = self.item_count as u32;

        if self.item_count >= self.layout.max_items {
            tracing::trace!(item_count = self.item_count, "pool full, evicting a victim");
            let victim_slot = self
                .directory
                .find_victim(&mut self.stats)
                .expect("eviction search exhausted: max_items must be greater than zero");
            let (vhash, vitem, vstate) = self.directory.entry_snapshot(victim_slot);
            victim = Some((victim_slot, vhash, vitem, vstate));
            self.directory.set_empty(victim_slot);
            self.item_count -= 1;
            new_item_index = vitem;
        }

        let (probe, scans) = self.directory.probe_insert_bytes(hash, key, &self.items);
        match probe {
            InsertProbe::Existing { slot } => {
                if let Some((vslot, vhash, vitem, vstate)) = victim {
                    self.directory.restore(vslot, vhash, vitem, vstate);
                    self.item_count += 1;
                }
                self.stats.updates.bump(scans);
                (self.directory.item_index_at(slot), true)
            }
            InsertProbe::Empty { slot } => {
                self.directory.occupy(slot, hash, new_item_index);
                self.item_count += 1;
                self.stats.adds.bump(scans);
                (new_item_index as usize, false)
            }
        }
    }

    fn alloc_new_entry_fast(&mut self, key: FastKey, hash: u32) -> (usize, bool) {
        let mut victim: Option<(u32, u32, u32, SlotState)> = None;
        let mut new_item_index = self.item_count as u32;

        if self.item_count >= self.layout.max_items {
            tracing::trace!(item_count = self.item_count, "pool full, evicting a victim");
            let victim_slot = self
                .directory
                .find_victim(&mut self.stats)
                .expect("eviction search exhausted: max_items must be greater than zero");
            let (vhash, vitem, vstate) = self.directory.entry_snapshot(victim_slot);
            victim = Some((victim_slot, vhash, vitem, vstate));
            self.directory.set_empty(victim_slot);
            self.item_count -= 1;
            new_item_index = vitem;
        }

        let (probe, scans) = self.directory.probe_insert_fast(hash, key, &self.items);
        match probe {
            InsertProbe::Existing { slot } => {
                if let Some((vslot, vhash, vitem, vstate)) = victim {
                    self.directory.restore(vslot, vhash, vitem, vstate);
                    self.item_count += 1;
                }
                self.stats.updates.bump(scans);
                (self.directory.item_index_at(slot), true)
            }
            InsertProbe::Empty { slot } => {
                self.directory.occupy(slot, hash, new_item_index);
                self.item_count += 1;
                self.stats.adds.bump(scans);
                (new_item_index as usize, false)
            }
        }
    }

    /// Inserts or updates `key` unconditionally. Cannot fail: no
    /// allocation happens past construction time. Returns whether an
    /// existing key was updated (`true`) or a new one added (`false`).
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> bool {
        debug_assert_eq!(key.len(), self.key_size);
        debug_assert_eq!(value.len(), self.value_size);
        let hash = self.hash_key(key);
        let (item_index, updated) = self.alloc_new_entry_bytes(key, hash);
        self.items.store(item_index, key, value);
        updated
    }

    /// Copies `key`'s value into `value_out` if present, without
    /// invoking the filler. Returns whether the key was found.
    pub fn lookup(&mut self, key: &[u8], value_out: &mut [u8]) -> bool {
        debug_assert_eq!(value_out.len(), self.value_size);
        let hash = self.hash_key(key);
        match self.directory.lookup_bytes(hash, key, &self.items, &mut self.stats) {
            Some(slot) => {
                let item_index = self.directory.item_index_at(slot);
                value_out.copy_from_slice(self.items.value(item_index));
                true
            }
            None => false,
        }
    }

    /// Copies `key`'s value into `value_out`, computing and inserting it
    /// via the filler on a miss.
    pub fn fetch(&mut self, key: &[u8], value_out: &mut [u8]) -> Result<(), FetchError> {
        debug_assert_eq!(value_out.len(), self.value_size);
        let hash = self.hash_key(key);
        if let Some(slot) = self.directory.lookup_bytes(hash, key, &self.items, &mut self.stats) {
            let item_index = self.directory.item_index_at(slot);
            value_out.copy_from_slice(self.items.value(item_index));
            return Ok(());
        }
        let value = self.fill_value(key)?;
        let (item_index, _) = self.alloc_new_entry_bytes(key, hash);
        self.items.store(item_index, key, &value);
        value_out.copy_from_slice(&value);
        Ok(())
    }

    /// Like [`Cache::fetch`], but returns a borrow of the stored value
    /// instead of copying it out. The borrow is only valid until the
    /// next mutating call — the borrow checker enforces this rather
    /// than a documentation comment.
    pub fn get(&mut self, key: &[u8]) -> Result<&[u8], FetchError> {
        let hash = self.hash_key(key);
        if let Some(slot) = self.directory.lookup_bytes(hash, key, &self.items, &mut self.stats) {
            let item_index = self.directory.item_index_at(slot);
            return Ok(self.items.value(item_index));
        }
        let value = self.fill_value(key)?;
        let (item_index, _) = self.alloc_new_entry_bytes(key, hash);
        self.items.store(item_index, key, &value);
        Ok(self.items.value(item_index))
    }

    /// The specialized fast path for a 16-byte-or-smaller key/value pair
    /// (`spec.md` §4.2). On a miss with no filler, or a failing filler,
    /// returns the configured NA value instead of an error.
    pub fn get_fast(&mut self, key: FastKey) -> FastValue {
        debug_assert!(self.layout.fast_mode, "get_fast requires a fast-mode key and value layout");
        let hash = hash32_fast(key);
        if let Some(slot) = self.directory.lookup_fast(hash, key, &self.items, &mut self.stats) {
            let item_index = self.directory.item_index_at(slot);
            return self.items.fast_value(item_index);
        }
        let key_bytes = key.to_bytes();
        match self.fill_value(&key_bytes[..self.key_size]) {
            Ok(value) => {
                let (item_index, _) = self.alloc_new_entry_fast(key, hash);
                self.items.store(item_index, &key_bytes[..self.key_size], &value);
                self.items.fast_value(item_index)
            }
            Err(_) => FastValue::from_bytes(&self.na_value),
        }
    }

    /// `f64 -> f64` convenience over [`Cache::get_fast`], supplementing
    /// the original's `ihtCacheGet_D_D` union-based inline accessor with
    /// a safe byte-conversion equivalent.
    pub fn get_fast_f64(&mut self, key: f64) -> f64 {
        let fast_key = FastKey::from_bytes(&key.to_le_bytes());
        let value = self.get_fast(fast_key);
        f64::from_le_bytes(value.to_bytes()[..8].try_into().unwrap())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if self.value_destroyer.is_some() {
            self.remove_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_sized_key_or_value() {
        assert_eq!(Cache::new(16, 0, 8).unwrap_err(), CacheError::InvalidKeySize);
        assert_eq!(Cache::new(16, 8, 0).unwrap_err(), CacheError::InvalidValueSize);
    }

    #[test]
    fn put_then_lookup_round_trips() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        let key = 7u64.to_le_bytes();
        let value = 42u64.to_le_bytes();
        assert!(!cache.put(&key, &value));
        let mut out = [0u8; 8];
        assert!(cache.lookup(&key, &mut out));
        assert_eq!(out, value);
    }

    #[test]
    fn put_of_existing_key_updates_not_adds() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        let key = 7u64.to_le_bytes();
        assert!(!cache.put(&key, &1u64.to_le_bytes()));
        assert_eq!(cache.item_count(), 1);
        assert!(cache.put(&key, &2u64.to_le_bytes()));
        assert_eq!(cache.item_count(), 1);
        let mut out = [0u8; 8];
        cache.lookup(&key, &mut out);
        assert_eq!(out, 2u64.to_le_bytes());
    }

    #[test]
    fn fetch_with_no_filler_errors() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(cache.fetch(&1u64.to_le_bytes(), &mut out).unwrap_err(), FetchError::NoProducer);
    }

    #[test]
    fn fetch_invokes_filler_once_per_miss() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        let mut calls = 0u32;
        cache.set_filler(move |key, value_out| {
            calls += 1;
            let k = u64::from_le_bytes(key.try_into().unwrap());
            value_out.copy_from_slice(&(k * 10).to_le_bytes());
            true
        });
        let mut out = [0u8; 8];
        cache.fetch(&5u64.to_le_bytes(), &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), 50);
        // second fetch of the same key must hit, not refill
        cache.fetch(&5u64.to_le_bytes(), &mut out).unwrap();
        assert_eq!(u64::from_le_bytes(out), 50);
    }

    #[test]
    fn get_fast_returns_na_value_on_failed_filler() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        cache.set_na_value(Some(&99u64.to_le_bytes()));
        cache.set_filler(|_, _| false);
        let value = cache.get_fast(FastKey::from_bytes(&1u64.to_le_bytes()));
        assert_eq!(value.to_bytes(), 99u64.to_le_bytes());
    }

    #[test]
    fn remove_all_runs_destroyer_over_occupied_slots() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        cache.put(&1u64.to_le_bytes(), &10u64.to_le_bytes());
        cache.put(&2u64.to_le_bytes(), &20u64.to_le_bytes());
        let destroyed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let destroyed_clone = destroyed.clone();
        cache.set_value_destroyer(move |value| {
            destroyed_clone.borrow_mut().push(u64::from_le_bytes(value.try_into().unwrap()));
        });
        cache.remove_all();
        let mut values = destroyed.borrow().clone();
        values.sort();
        assert_eq!(values, vec![10, 20]);
        assert_eq!(cache.item_count(), 0);
    }

    #[test]
    fn reconfigure_resizes_and_clears() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        cache.put(&1u64.to_le_bytes(), &1u64.to_le_bytes());
        cache.set_min_capacity(1000);
        cache.reconfigure().unwrap();
        assert_eq!(cache.item_count(), 0);
        assert!(cache.max_items() > 16);
    }

    #[test]
    fn eviction_keeps_item_count_at_capacity() {
        let mut cache = Cache::new(16, 8, 8).unwrap();
        let max_items = cache.max_items();
        for i in 0..(max_items as u64 * 4) {
            cache.put(&i.to_le_bytes(), &i.to_le_bytes());
            assert!(cache.item_count() <= max_items);
        }
    }
}
