//! Lock-free SPSC FIFO primitives
//!
//! Two layers: a generic single-producer/single-consumer `Fifo<T>` used for
//! every cross-thread hand-off in the analyzer (audio blocks, FFT frames,
//! rendered paths), and `SampleBlockFifo`, which accumulates single samples
//! from the audio callback into fixed-size mono blocks.
//!
//! # SPSC contract
//!
//! Exactly one thread may call `push` and exactly one (possibly different)
//! thread may call `pull`. Concurrent calls from the same role are undefined
//! behavior. `prepare` is not real-time safe and must only be called while
//! audio is stopped, before the fifo is shared.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free single-producer/single-consumer queue of reusable slots.
///
/// Cursors increase monotonically; `cursor % capacity` indexes the slot.
/// The producer publishes a slot with a Release store that the consumer
/// observes with an Acquire load, so data written before a successful
/// `push` is visible after the matching `pull`.
pub struct Fifo<T> {
    slots: Box<[UnsafeCell<T>]>,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

// SAFETY: slot access is partitioned by the SPSC contract - the producer
// only writes slots between read_pos and read_pos + capacity, the consumer
// only reads slots below write_pos, and the Acquire/Release cursor pair
// orders those accesses.
unsafe impl<T: Send> Send for Fifo<T> {}
unsafe impl<T: Send> Sync for Fifo<T> {}

impl<T: Clone> Fifo<T> {
    /// Create an unprepared fifo with zero capacity.
    pub fn new() -> Self {
        Self {
            slots: Box::new([]),
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Allocate `capacity` slots, each cloned from `template`, and reset
    /// both cursors.
    ///
    /// Not real-time safe. Pre-sizing the slots from a template is what
    /// keeps `push`/`pull` allocation-free: `clone_from` between
    /// equal-sized buffers reuses the existing storage.
    pub fn prepare(&mut self, capacity: usize, template: T) {
        self.slots = (0..capacity)
            .map(|_| UnsafeCell::new(template.clone()))
            .collect();
        self.read_pos.store(0, Ordering::Relaxed);
        self.write_pos.store(0, Ordering::Relaxed);
    }

    /// Copy `item` into the next free slot. Fails (returns false) when the
    /// fifo is full. Never blocks, never allocates.
    pub fn push(&self, item: &T) -> bool {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);

        if write.wrapping_sub(read) >= self.slots.len() {
            return false; // full - caller skips this cycle
        }

        // SAFETY: this slot is past the consumer's cursor and only the
        // single producer writes slots, per the SPSC contract.
        unsafe {
            (*self.slots[write % self.slots.len()].get()).clone_from(item);
        }

        self.write_pos.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Copy the oldest unread slot into `out`. Fails (returns false) when
    /// the fifo is empty.
    pub fn pull(&self, out: &mut T) -> bool {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);

        if write == read {
            return false; // empty
        }

        // SAFETY: write > read, so this slot was fully written before the
        // producer's Release store that we just Acquired.
        unsafe {
            out.clone_from(&*self.slots[read % self.slots.len()].get());
        }

        self.read_pos.store(read.wrapping_add(1), Ordering::Release);
        true
    }

    /// Number of complete items ready for reading.
    pub fn num_available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Total slot count.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Clone> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Block capacity of a [`SampleBlockFifo`]. Enough to absorb a few refresh
/// cycles of backpressure before pushes start failing.
pub const BLOCK_FIFO_CAPACITY: usize = 30;

/// Accumulates mono samples from the real-time callback into fixed-size
/// blocks and queues completed blocks for the analysis thread.
///
/// The producer side (`push_sample`) is wait-free and allocation-free; a
/// full queue silently drops the completed block, which only degrades the
/// visualization, never the audio.
pub struct SampleBlockFifo {
    fifo: Fifo<Vec<f32>>,
    /// Producer-only scratch block being filled.
    fill: UnsafeCell<Vec<f32>>,
    /// Producer-only write index into `fill`.
    fill_index: UnsafeCell<usize>,
    block_size: usize,
}

// SAFETY: `fill` and `fill_index` are touched exclusively by the single
// producer thread; the inner fifo handles the cross-thread hand-off.
unsafe impl Send for SampleBlockFifo {}
unsafe impl Sync for SampleBlockFifo {}

impl SampleBlockFifo {
    pub fn new() -> Self {
        Self {
            fifo: Fifo::new(),
            fill: UnsafeCell::new(Vec::new()),
            fill_index: UnsafeCell::new(0),
            block_size: 0,
        }
    }

    /// Size the fifo for `block_size`-sample blocks. Not real-time safe;
    /// call while audio is stopped, before sharing.
    pub fn prepare(&mut self, block_size: usize) {
        self.fifo.prepare(BLOCK_FIFO_CAPACITY, vec![0.0; block_size]);
        *self.fill.get_mut() = vec![0.0; block_size];
        *self.fill_index.get_mut() = 0;
        self.block_size = block_size;
    }

    /// Append one sample to the block under construction, queueing the
    /// previous block once a full one has been assembled.
    ///
    /// Producer side only. No allocations, no locks, O(1).
    #[inline]
    pub fn push_sample(&self, sample: f32) {
        // SAFETY: producer-only state, per the struct invariant.
        let fill = unsafe { &mut *self.fill.get() };
        let index = unsafe { &mut *self.fill_index.get() };

        if *index == self.block_size {
            // Push failure means the consumer is behind; dropping the block
            // is the documented backpressure policy.
            let _ = self.fifo.push(fill);
            *index = 0;
        }

        fill[*index] = sample;
        *index += 1;
    }

    /// Number of completed blocks ready for the consumer.
    pub fn num_complete_blocks_available(&self) -> usize {
        self.fifo.num_available()
    }

    /// Pull the oldest completed block into `out`. `out` is resized by the
    /// copy, so reusing one buffer across calls stays allocation-free.
    pub fn pull_block(&self, out: &mut Vec<f32>) -> bool {
        self.fifo.pull(out)
    }

    /// Samples per completed block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Default for SampleBlockFifo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn push_pull_preserves_fifo_order() {
        let mut fifo = Fifo::new();
        fifo.prepare(8, 0.0_f32);

        for i in 0..5 {
            assert!(fifo.push(&(i as f32)));
        }

        let mut out = 0.0;
        for i in 0..5 {
            assert!(fifo.pull(&mut out));
            assert_eq!(out, i as f32);
        }
    }

    #[test]
    fn push_fails_when_full() {
        let mut fifo = Fifo::new();
        fifo.prepare(4, 0_u32);

        for i in 0..4 {
            assert!(fifo.push(&i));
        }
        assert!(!fifo.push(&99), "push must fail once capacity is reached");
        assert_eq!(fifo.num_available(), 4);
    }

    #[test]
    fn pull_fails_when_empty() {
        let mut fifo = Fifo::new();
        fifo.prepare(4, 0_u32);

        let mut out = 0;
        assert!(!fifo.pull(&mut out));

        assert!(fifo.push(&7));
        assert!(fifo.pull(&mut out));
        assert_eq!(out, 7);
        assert!(!fifo.pull(&mut out), "fifo must be logically empty again");
    }

    #[test]
    fn cursors_wrap_around_capacity() {
        let mut fifo = Fifo::new();
        fifo.prepare(4, 0_u32);
        let mut out = 0;

        // Cycle more items through than the capacity holds at once.
        for round in 0..10 {
            for i in 0..3 {
                assert!(fifo.push(&(round * 10 + i)));
            }
            for i in 0..3 {
                assert!(fifo.pull(&mut out));
                assert_eq!(out, round * 10 + i);
            }
        }
    }

    #[test]
    fn prepare_resets_state() {
        let mut fifo = Fifo::new();
        fifo.prepare(4, 0_u32);
        fifo.push(&1);
        fifo.push(&2);

        fifo.prepare(4, 0_u32);
        assert_eq!(fifo.num_available(), 0);
        let mut out = 0;
        assert!(!fifo.pull(&mut out));
    }

    #[test]
    fn vec_slots_round_trip_without_resizing() {
        let mut fifo = Fifo::new();
        fifo.prepare(2, vec![0.0_f32; 4]);

        let block = vec![1.0, 2.0, 3.0, 4.0];
        assert!(fifo.push(&block));

        let mut out = vec![0.0; 4];
        assert!(fifo.pull(&mut out));
        assert_eq!(out, block);
    }

    #[test]
    fn spsc_order_holds_across_threads() {
        let mut fifo = Fifo::new();
        fifo.prepare(16, 0_u64);
        let fifo = Arc::new(fifo);

        const COUNT: u64 = 10_000;

        let producer = {
            let fifo = Arc::clone(&fifo);
            std::thread::spawn(move || {
                for i in 0..COUNT {
                    while !fifo.push(&i) {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut out = 0_u64;
        for expected in 0..COUNT {
            while !fifo.pull(&mut out) {
                std::thread::yield_now();
            }
            assert_eq!(out, expected);
        }

        producer.join().unwrap();
    }

    #[test]
    fn block_fifo_completes_blocks() {
        let mut fifo = SampleBlockFifo::new();
        fifo.prepare(4);

        // 9 samples = two complete blocks handed over (the third is still
        // filling; a block is queued when the sample after it arrives).
        for i in 0..9 {
            fifo.push_sample(i as f32);
        }

        assert_eq!(fifo.num_complete_blocks_available(), 2);

        let mut block = vec![0.0; 4];
        assert!(fifo.pull_block(&mut block));
        assert_eq!(block, vec![0.0, 1.0, 2.0, 3.0]);
        assert!(fifo.pull_block(&mut block));
        assert_eq!(block, vec![4.0, 5.0, 6.0, 7.0]);
        assert!(!fifo.pull_block(&mut block));
    }

    #[test]
    fn saturated_block_fifo_keeps_exactly_capacity_blocks() {
        let mut fifo = SampleBlockFifo::new();
        fifo.prepare(512);

        // 40 blocks of 512 samples against a 30-block queue. The extra
        // sample nudges the 40th completed block into the fifo's push path.
        for i in 0..(40 * 512 + 1) {
            fifo.push_sample((i / 512) as f32);
        }

        assert_eq!(fifo.num_complete_blocks_available(), BLOCK_FIFO_CAPACITY);

        // The survivors are the oldest 30 blocks, in order; the newest 10
        // were dropped by the failed pushes.
        let mut block = vec![0.0; 512];
        let mut drained = 0;
        while fifo.pull_block(&mut block) {
            assert!(block.iter().all(|&s| s == drained as f32));
            drained += 1;
        }
        assert_eq!(drained, BLOCK_FIFO_CAPACITY);
    }
}
