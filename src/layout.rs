//! Capacity rounding and item-pool layout (`spec.md` §4.6).
//!
//! Grounded on `examples/original_source/src/index-hash-table.c`'s
//! `setup()` and `src/shm/layout.rs`'s offset bookkeeping.
use crate::fast::FastKey;

pub const MIN_CAPACITY: usize = 16;
pub const DEFAULT_LOAD_FACTOR: f64 = 0.40;

/// Layout of a single item-pool record, plus the table sizing it implies.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    pub key_size: usize,
    pub value_size: usize,
    pub max_load_factor: f64,

    pub fast_key: bool,
    pub fast_value: bool,
    pub short_key: bool,
    pub fast_mode: bool,

    pub max_entries: usize,
    pub entries_mask: u32,
    pub max_items: usize,

    pub item_size: usize,
    pub key_offset: usize,
    pub value_offset: usize,
}

impl Layout {
    pub fn compute(min_capacity: usize, key_size: usize, value_size: usize, max_load_factor: f64) -> Self {
        let capacity = min_capacity.max(MIN_CAPACITY);
        let min_entries = ((capacity as f64) / max_load_factor).ceil() as usize;
        let max_entries = min_entries.max(1).next_power_of_two();
        let max_items = ((max_entries as f64) * max_load_factor) as usize;

        let fast_key = key_size <= FastKey::SIZE;
        let fast_value = value_size <= FastKey::SIZE;
        let short_key = key_size < FastKey::SIZE;
        let fast_mode = fast_key && fast_value;

        let (item_size, key_offset, value_offset) = if fast_mode {
            (2 * FastKey::SIZE, 0, FastKey::SIZE)
        } else {
            // General mode: key then value, back to back, with the
            // field that exceeds the fast-register size realigned to
            // a 16-byte boundary (the idiomatic stand-in for C's
            // `max_align_t`).
            const ALIGN: usize = 16;
            let key_offset = 0usize;
            let value_offset = key_size;
            if !fast_key {
                // Key exceeds the fast size: pad the value's start up
                // to an ALIGN boundary.
                let value_offset = round_up(value_offset, ALIGN);
                let item_size = value_offset + value_size;
                (item_size, key_offset, value_offset)
            } else {
                // Value exceeds the fast size but key doesn't: the
                // value is the oversized field, so it's the one that
                // must start at an ALIGN-aligned offset.
                let value_offset = round_up(value_offset, ALIGN);
                let item_size = round_up(value_offset + value_size, ALIGN);
                (item_size, key_offset, value_offset)
            }
        };

        Layout {
            key_size,
            value_size,
            max_load_factor,
            fast_key,
            fast_value,
            short_key,
            fast_mode,
            max_entries,
            entries_mask: (max_entries - 1) as u32,
            max_items,
            item_size,
            key_offset,
            value_offset,
        }
    }
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}
