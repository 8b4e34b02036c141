//! Throughput counters shared between capture, encoder completion and the
//! metrics task

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Both rolling counters live in one word so a sample reads and zeroes them
/// together: captures in the low half, processed frames in the high half.
/// Each half saturates at `u32::MAX` rather than carrying into the other.
const CAPTURED_UNIT: u64 = 1;
const PROCESSED_UNIT: u64 = 1 << 32;
const HALF_MASK: u64 = 0xFFFF_FFFF;

/// Rolling rate counters plus lifetime totals
#[derive(Debug, Default)]
pub struct ThroughputCounters {
    rolling: CachePadded<AtomicU64>,
    totals: CachePadded<Totals>,
}

#[derive(Debug, Default)]
struct Totals {
    captured: AtomicU64,
    processed: AtomicU64,
    encode_failures: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Rates derived from one sampling period
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rates {
    pub capture_hz: f64,
    pub process_hz: f64,
}

/// Lifetime totals since construction or the last `reset()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterTotals {
    pub captured: u64,
    pub processed: u64,
    pub encode_failures: u64,
    pub frames_dropped: u64,
}

impl ThroughputCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_captured(&self) {
        self.bump(CAPTURED_UNIT, 0);
        self.totals.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_processed(&self) {
        self.bump(PROCESSED_UNIT, 32);
        self.totals.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn bump(&self, unit: u64, shift: u32) {
        let _ = self
            .rolling
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |packed| {
                ((packed >> shift) & HALF_MASK != HALF_MASK).then_some(packed + unit)
            });
    }

    pub fn record_encode_failure(&self) {
        self.totals.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A completed frame the ring refused because a drain was in progress
    pub fn record_dropped(&self) {
        self.totals.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and zero both rolling counters in one step, dividing by
    /// `elapsed_secs`. A non-positive elapsed time yields zero rates; the
    /// counts are still consumed.
    pub fn sample_and_reset(&self, elapsed_secs: f64) -> Rates {
        let packed = self.rolling.swap(0, Ordering::AcqRel);
        let captured = (packed & HALF_MASK) as f64;
        let processed = (packed >> 32) as f64;

        if elapsed_secs > 0.0 {
            Rates {
                capture_hz: captured / elapsed_secs,
                process_hz: processed / elapsed_secs,
            }
        } else {
            Rates::default()
        }
    }

    pub fn totals(&self) -> CounterTotals {
        CounterTotals {
            captured: self.totals.captured.load(Ordering::Relaxed),
            processed: self.totals.processed.load(Ordering::Relaxed),
            encode_failures: self.totals.encode_failures.load(Ordering::Relaxed),
            frames_dropped: self.totals.frames_dropped.load(Ordering::Relaxed),
        }
    }

    pub fn total_captured(&self) -> u64 {
        self.totals.captured.load(Ordering::Relaxed)
    }

    pub fn total_processed(&self) -> u64 {
        self.totals.processed.load(Ordering::Relaxed)
    }

    /// Zero everything, rolling counters included.
    pub fn reset(&self) {
        self.rolling.store(0, Ordering::Relaxed);
        self.totals.captured.store(0, Ordering::Relaxed);
        self.totals.processed.store(0, Ordering::Relaxed);
        self.totals.encode_failures.store(0, Ordering::Relaxed);
        self.totals.frames_dropped.store(0, Ordering::Relaxed);
    }
}
