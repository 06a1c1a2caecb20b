//! Operation counters and the `print_stats` golden output format
//! (`spec.md` §6).
//!
//! Grounded on `src/store.rs`'s `CacheInfo`/`cache_info()` for the
//! counter-snapshot shape, and on
//! `examples/original_source/src/index-hash-table.c`'s
//! `print_counter`/`ihtCachePrintStats` for the exact text format.
use std::io::{self, Write};

/// A `{count, scans}` pair — `scans` accumulates probe lengths so
/// callers can derive a mean-probe-length ratio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    pub count: u64,
    pub scans: u64,
}

impl Counter {
    #[inline]
    pub fn bump(&mut self, scans: u64) {
        self.count += 1;
        self.scans += scans;
    }

    /// Mean probe length; `-1.00` when `count == 0` (`spec.md` §6).
    pub fn ratio(&self) -> f64 {
        if self.count == 0 {
            -1.0
        } else {
            self.scans as f64 / self.count as f64
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub lookups: u64,
    pub hits: Counter,
    pub misses: Counter,
    pub adds: Counter,
    pub updates: Counter,
    pub evictions: Counter,
}

/// Level of detail for `print_stats` (`spec.md` §6, `detail ∈ {0,1,2}`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsDetail {
    Minimal = 0,
    Standard = 1,
    PerCounter = 2,
}

impl Stats {
    pub fn clear(&mut self) {
        *self = Stats::default();
    }

    fn hit_pct(&self) -> f64 {
        100.0 * self.hits.count as f64 / self.lookups.max(1) as f64
    }

    fn miss_pct(&self) -> f64 {
        100.0 * self.misses.count as f64 / self.lookups.max(1) as f64
    }

    /// Writes the normative golden format from `spec.md` §6.
    pub fn print(
        &self,
        sink: &mut impl Write,
        label: &str,
        indent: usize,
        detail: StatsDetail,
    ) -> io::Result<()> {
        let pad = " ".repeat(indent);
        writeln!(
            sink,
            "{pad}{label}: Cache Stats: lookups: {} hit={:.2}% miss={:.2}%",
            self.lookups,
            self.hit_pct(),
            self.miss_pct()
        )?;

        if matches!(detail, StatsDetail::Minimal) {
            return Ok(());
        }

        self.print_counter(sink, indent, "hits", self.hits)?;
        self.print_counter(sink, indent, "misses", self.misses)?;

        if matches!(detail, StatsDetail::PerCounter) {
            self.print_counter(sink, indent, "adds", self.adds)?;
            self.print_counter(sink, indent, "updates", self.updates)?;
            self.print_counter(sink, indent, "evictions", self.evictions)?;
        }
        Ok(())
    }

    fn print_counter(
        &self,
        sink: &mut impl Write,
        indent: usize,
        label: &str,
        counter: Counter,
    ) -> io::Result<()> {
        let pad = " ".repeat(indent);
        writeln!(
            sink,
            "{pad}{label}: {} (scans={}, ratio={:.2})",
            counter.count,
            counter.scans,
            counter.ratio()
        )
    }
}
