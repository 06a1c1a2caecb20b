//! 32-bit key hashing: a hardware CRC32C path for 16-byte fast keys, and
//! a software multiplicative-mix path for everything else.
//!
//! Grounded on `examples/original_source/src/index-hash-table.c`'s
//! `fast_key_hash`/`key_hash` — this is the literal mechanism
//! `spec.md` §4.1 describes, so it's built directly on `core::arch`
//! rather than an external hashing crate.
use std::sync::OnceLock;

use crate::fast::FastKey;

/// Knuth's 32-bit golden-ratio constant, used to seed the CRC path.
const SEED_32: u32 = 0x9E37_7989;
/// 64-bit golden-ratio constant used by the software mixing path.
pub const GOLD64: u64 = 0x9E37_79B9_7F4A_7C15;

fn use_crc32_cell() -> &'static OnceLock<bool> {
    static CELL: OnceLock<bool> = OnceLock::new();
    &CELL
}

/// Whether the hardware CRC32C path is available on this process.
///
/// Detected once, process-wide, on first use — mirrors the original's
/// `static bool use_crc` set at first `ihtCacheCreate`, but through a
/// `OnceLock` instead of a bare mutable static.
pub fn use_crc32() -> bool {
    *use_crc32_cell().get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            std::is_x86_64_feature_detected!("sse4.2")
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            false
        }
    })
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse4.2")]
unsafe fn crc_hash(key: FastKey) -> u32 {
    use core::arch::x86_64::_mm_crc32_u64;
    let mut crc = SEED_32 as u64;
    crc = _mm_crc32_u64(crc, key.v0);
    crc = _mm_crc32_u64(crc, key.v1);
    crc as u32
}

fn software_hash(key: FastKey) -> u32 {
    let mut h = key.v0 ^ key.v1.wrapping_add(GOLD64);
    h = h.wrapping_mul(GOLD64);
    h ^= h >> 32;
    h as u32
}

/// Hash a 16-byte fast key (`spec.md` §4.1 hardware/software split).
#[inline]
pub fn hash32_fast(key: FastKey) -> u32 {
    if use_crc32() {
        #[cfg(target_arch = "x86_64")]
        {
            // SAFETY: `use_crc32()` only returns true when SSE4.2 was
            // detected at runtime via `is_x86_64_feature_detected!`.
            return unsafe { crc_hash(key) };
        }
    }
    software_hash(key)
}

/// Hash an arbitrary-length key via the general software mixing path
/// (`spec.md` §4.1 software path). Used for keys that exceed the
/// 16-byte fast representation.
pub fn hash32_bytes(key: &[u8]) -> u32 {
    let mut h = GOLD64.wrapping_add(key.len() as u64);
    let mut chunks = key.chunks_exact(8);
    for chunk in &mut chunks {
        let w = u64::from_le_bytes(chunk.try_into().unwrap());
        h ^= w;
        h = h.wrapping_mul(GOLD64);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut buf = [0u8; 8];
        buf[..tail.len()].copy_from_slice(tail);
        let w = u64::from_le_bytes(buf);
        h ^= w;
        h = h.wrapping_mul(GOLD64);
    }
    h ^= h >> 32;
    h ^= h >> 16;
    h as u32
}
