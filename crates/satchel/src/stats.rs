// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache operation statistics.

use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

/// Live counters, shared by every clone of a cache.
///
/// Recording is a handful of relaxed atomic increments and becomes a no-op
/// when statistics are disabled.
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    removals: AtomicU64,
    get_time_nanos: AtomicU64,
    put_time_nanos: AtomicU64,
    remove_time_nanos: AtomicU64,
}

impl StatCounters {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            ..Self::default()
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn record_hits(&self, count: u64) {
        if self.is_enabled() {
            self.hits.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_misses(&self, count: u64) {
        if self.is_enabled() {
            self.misses.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_puts(&self, count: u64) {
        if self.is_enabled() {
            self.puts.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_removals(&self, count: u64) {
        if self.is_enabled() {
            self.removals.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_get_time(&self, elapsed: Duration) {
        if self.is_enabled() {
            self.get_time_nanos.fetch_add(as_nanos(elapsed), Ordering::Relaxed);
        }
    }

    pub(crate) fn record_put_time(&self, elapsed: Duration) {
        if self.is_enabled() {
            self.put_time_nanos.fetch_add(as_nanos(elapsed), Ordering::Relaxed);
        }
    }

    pub(crate) fn record_remove_time(&self, elapsed: Duration) {
        if self.is_enabled() {
            self.remove_time_nanos.fetch_add(as_nanos(elapsed), Ordering::Relaxed);
        }
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.removals.store(0, Ordering::Relaxed);
        self.get_time_nanos.store(0, Ordering::Relaxed);
        self.put_time_nanos.store(0, Ordering::Relaxed);
        self.remove_time_nanos.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            get_time_nanos: self.get_time_nanos.load(Ordering::Relaxed),
            put_time_nanos: self.put_time_nanos.load(Ordering::Relaxed),
            remove_time_nanos: self.remove_time_nanos.load(Ordering::Relaxed),
        }
    }
}

fn as_nanos(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
}

/// A point-in-time snapshot of a cache's operation statistics.
///
/// Obtained from [`Cache::statistics`](crate::Cache::statistics). An expired
/// value found on read counts as a miss even though the store still held it
/// at the time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    hits: u64,
    misses: u64,
    puts: u64,
    removals: u64,
    get_time_nanos: u64,
    put_time_nanos: u64,
    remove_time_nanos: u64,
}

impl CacheStatistics {
    /// The number of reads that found a live value.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// The number of reads that found nothing, including expired values.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// The total number of reads.
    #[must_use]
    pub fn gets(&self) -> u64 {
        self.hits + self.misses
    }

    /// The number of values stored by user operations.
    ///
    /// Bulk and read-through loading do not count as puts.
    #[must_use]
    pub fn puts(&self) -> u64 {
        self.puts
    }

    /// The number of values removed by user operations.
    #[must_use]
    pub fn removals(&self) -> u64 {
        self.removals
    }

    /// The percentage of reads that were hits, or 0 when there were none.
    #[must_use]
    pub fn hit_percentage(&self) -> f64 {
        ratio(self.hits, self.gets())
    }

    /// The percentage of reads that were misses, or 0 when there were none.
    #[must_use]
    pub fn miss_percentage(&self) -> f64 {
        ratio(self.misses, self.gets())
    }

    /// The mean latency of reads, or zero when there were none.
    #[must_use]
    pub fn average_get_time(&self) -> Duration {
        average(self.get_time_nanos, self.gets())
    }

    /// The mean latency of puts, or zero when there were none.
    #[must_use]
    pub fn average_put_time(&self) -> Duration {
        average(self.put_time_nanos, self.puts)
    }

    /// The mean latency of removals, or zero when there were none.
    #[must_use]
    pub fn average_remove_time(&self) -> Duration {
        average(self.remove_time_nanos, self.removals)
    }
}

#[expect(clippy::cast_precision_loss, reason = "statistics are advisory")]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64) * 100.0
    }
}

fn average(total_nanos: u64, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(total_nanos / count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counters_record_nothing() {
        let counters = StatCounters::new(false);
        counters.record_hits(1);
        counters.record_misses(1);
        counters.record_puts(1);
        assert_eq!(counters.snapshot(), CacheStatistics::default());
    }

    #[test]
    fn enabled_counters_accumulate() {
        let counters = StatCounters::new(true);
        counters.record_hits(3);
        counters.record_misses(1);
        counters.record_puts(2);
        counters.record_removals(1);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.hits(), 3);
        assert_eq!(snapshot.misses(), 1);
        assert_eq!(snapshot.gets(), 4);
        assert_eq!(snapshot.puts(), 2);
        assert_eq!(snapshot.removals(), 1);
    }

    #[test]
    fn percentages_handle_zero_gets() {
        let snapshot = StatCounters::new(true).snapshot();
        assert!((snapshot.hit_percentage() - 0.0).abs() < f64::EPSILON);
        assert!((snapshot.miss_percentage() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hit_percentage_reflects_ratio() {
        let counters = StatCounters::new(true);
        counters.record_hits(3);
        counters.record_misses(1);
        let snapshot = counters.snapshot();
        assert!((snapshot.hit_percentage() - 75.0).abs() < f64::EPSILON);
        assert!((snapshot.miss_percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn average_times_divide_by_operation_count() {
        let counters = StatCounters::new(true);
        counters.record_hits(2);
        counters.record_get_time(Duration::from_nanos(100));
        counters.record_get_time(Duration::from_nanos(300));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.average_get_time(), Duration::from_nanos(200));
        assert_eq!(snapshot.average_put_time(), Duration::ZERO);
    }

    #[test]
    fn reset_clears_all_counters() {
        let counters = StatCounters::new(true);
        counters.record_hits(5);
        counters.record_put_time(Duration::from_secs(1));
        counters.reset();
        assert_eq!(counters.snapshot(), CacheStatistics::default());
    }
}
