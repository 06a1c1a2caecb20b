//! The densely packed `(key, value)` item storage (`spec.md` §3, §4.6).
//!
//! Grounded on `src/shm/region.rs`'s slab arena, translated from a
//! mmap'd raw pointer into an owned `Vec<u8>` — the crate has no
//! cross-process sharing to support, so plain heap storage replaces
//! the mmap'd slab.
use crate::error::CacheError;
use crate::fast::FastKey;
use crate::layout::Layout;

pub struct ItemPool {
    data: Vec<u8>,
    layout: Layout,
}

impl ItemPool {
    pub fn try_new(layout: Layout) -> Result<Self, CacheError> {
        let mut data = Vec::new();
        data.try_reserve_exact(layout.max_items * layout.item_size)
            .map_err(|_| CacheError::OutOfMemory)?;
        data.resize(layout.max_items * layout.item_size, 0);
        Ok(ItemPool { data, layout })
    }

    #[inline]
    fn record(&self, item_index: usize) -> &[u8] {
        let start = item_index * self.layout.item_size;
        &self.data[start..start + self.layout.item_size]
    }

    #[inline]
    fn record_mut(&mut self, item_index: usize) -> &mut [u8] {
        let start = item_index * self.layout.item_size;
        let size = self.layout.item_size;
        &mut self.data[start..start + size]
    }

    pub fn key(&self, item_index: usize) -> &[u8] {
        let off = self.layout.key_offset;
        &self.record(item_index)[off..off + self.layout.key_size]
    }

    pub fn value(&self, item_index: usize) -> &[u8] {
        let off = self.layout.value_offset;
        &self.record(item_index)[off..off + self.layout.value_size]
    }

    pub fn fast_key(&self, item_index: usize) -> FastKey {
        FastKey::from_bytes(self.key(item_index))
    }

    pub fn fast_value(&self, item_index: usize) -> FastKey {
        FastKey::from_bytes(self.value(item_index))
    }

    /// Two-memcpy store into the item pool (`spec.md` §4.3).
    pub fn store(&mut self, item_index: usize, key: &[u8], value: &[u8]) {
        debug_assert_eq!(key.len(), self.layout.key_size);
        debug_assert_eq!(value.len(), self.layout.value_size);
        let (key_off, value_off) = (self.layout.key_offset, self.layout.value_offset);
        let rec = self.record_mut(item_index);
        rec[key_off..key_off + key.len()].copy_from_slice(key);
        rec[value_off..value_off + value.len()].copy_from_slice(value);
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}
