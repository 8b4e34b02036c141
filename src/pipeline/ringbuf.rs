//! Fixed-capacity frame ring with overwrite-oldest insertion and drain mode

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::record::FrameRecord;

/// Sequence-numbered ring of encoded frames.
///
/// The producer (encoder completion) never blocks on a drain: while a
/// [`DrainGuard`] is alive every [`append`](FrameRing::append) is dropped.
/// The state lock is only ever held for O(1) bookkeeping or a snapshot copy
/// of `capacity` pointers.
pub struct FrameRing {
    capacity: usize,

    /// Slots and cursors
    state: Mutex<RingState>,

    /// Serializes drain consumers and `clear()`
    gate: Mutex<()>,

    /// Statistics
    stats: CachePadded<Stats>,
}

struct RingState {
    slots: Box<[Option<Arc<FrameRecord>>]>,
    write_cursor: usize,
    count: usize,
    total_accepted: u64,
    draining: bool,
}

#[derive(Default)]
struct Stats {
    frames_overwritten: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Lifetime counters of a ring since construction or the last `clear()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingStats {
    pub total_accepted: u64,
    pub frames_overwritten: u64,
    pub frames_dropped: u64,
}

impl RingState {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            write_cursor: 0,
            count: 0,
            total_accepted: 0,
            draining: false,
        }
    }

    fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.write_cursor = 0;
        self.count = 0;
        self.total_accepted = 0;
    }

    /// Live records, oldest first
    fn live(&self) -> Vec<Arc<FrameRecord>> {
        let capacity = self.slots.len();
        let oldest = (self.write_cursor + capacity - self.count) % capacity;
        (0..self.count)
            .filter_map(|offset| self.slots[(oldest + offset) % capacity].clone())
            .collect()
    }
}

impl FrameRing {
    pub fn new(capacity: usize) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "ring capacity must be greater than zero".into(),
            ));
        }

        Ok(Self {
            capacity,
            state: Mutex::new(RingState::new(capacity)),
            gate: Mutex::new(()),
            stats: CachePadded::new(Stats::default()),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer: insert a record, overwriting the oldest when full.
    ///
    /// Returns the assigned sequence id, or `None` when the frame was dropped
    /// because a drain is in progress.
    pub fn append(&self, mut record: FrameRecord) -> Option<u64> {
        let mut state = self.state.lock();

        if state.draining {
            drop(state);
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let sequence_id = state.total_accepted;
        record.sequence_id = sequence_id;

        let cursor = state.write_cursor;
        let evicted = state.slots[cursor].replace(Arc::new(record));
        state.write_cursor = (cursor + 1) % self.capacity;
        state.total_accepted += 1;
        if state.count < self.capacity {
            state.count += 1;
        }
        drop(state);

        if evicted.is_some() {
            self.stats.frames_overwritten.fetch_add(1, Ordering::Relaxed);
        }
        Some(sequence_id)
    }

    /// Enter drain mode. Blocks while another consumer holds the ring;
    /// appends are dropped until the guard is released or dropped.
    ///
    /// Not reentrant: acquiring twice from the same thread deadlocks.
    pub fn acquire_exclusive(&self) -> DrainGuard<'_> {
        let gate = self.gate.lock();
        self.state.lock().draining = true;
        DrainGuard { ring: self, _gate: gate }
    }

    /// Enter drain mode only if no other consumer currently holds the ring.
    pub fn try_acquire_exclusive(&self) -> Option<DrainGuard<'_>> {
        let gate = self.gate.try_lock()?;
        self.state.lock().draining = true;
        Some(DrainGuard { ring: self, _gate: gate })
    }

    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    /// Discard live records and reset cursors, totals and stats.
    ///
    /// Waits for any drain in progress. Inside a drain use
    /// [`DrainGuard::clear`] instead.
    pub fn clear(&self) {
        let _gate = self.gate.lock();
        self.reset();
    }

    fn reset(&self) {
        self.state.lock().reset();
        self.stats.frames_overwritten.store(0, Ordering::Relaxed);
        self.stats.frames_dropped.store(0, Ordering::Relaxed);
        debug!("Frame ring cleared");
    }

    /// Current number of live records (0..=capacity)
    pub fn size(&self) -> usize {
        self.state.lock().count
    }

    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn total_accepted(&self) -> u64 {
        self.state.lock().total_accepted
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            total_accepted: self.total_accepted(),
            frames_overwritten: self.stats.frames_overwritten.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRing")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive, frozen view of a [`FrameRing`].
///
/// The live set cannot change while the guard is held, so repeated reads
/// return the same records. Dropping the guard leaves drain mode.
pub struct DrainGuard<'a> {
    ring: &'a FrameRing,
    _gate: MutexGuard<'a, ()>,
}

impl DrainGuard<'_> {
    /// Live records in insertion order, oldest first
    pub fn records(&self) -> Vec<Arc<FrameRecord>> {
        self.ring.state.lock().live()
    }

    pub fn len(&self) -> usize {
        self.ring.state.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key_frame_count(&self) -> usize {
        self.records().iter().filter(|r| r.is_key_frame()).count()
    }

    /// Reset the ring without leaving drain mode.
    pub fn clear(&self) {
        self.ring.reset();
    }

    /// Leave drain mode.
    pub fn release(self) {}
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        // `_gate` is released after this runs
        self.ring.state.lock().draining = false;
    }
}
