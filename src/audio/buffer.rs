//! Bounded sample queue between the receive loop and the playback callback
//!
//! Samples travel through a lock-free [`ArrayQueue`], so the audio thread
//! never waits on the producer. The producer parks on a condvar while the
//! queue is full, which paces the receive loop to the device clock.

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on queue storage, in samples (4 MiB of `f32`)
pub const MAX_QUEUE_SAMPLES: usize = 1 << 20;

/// Longest single park of the producer; the consumer signals without
/// taking the gate, so a wakeup can slip past and is picked up here
const MAX_PARK: Duration = Duration::from_millis(2);

/// Bounded queue of interleaved `f32` samples
pub struct SampleQueue {
    samples: ArrayQueue<f32>,
    /// Only the producer parks here
    gate: Mutex<()>,
    space: Condvar,
    underrun_count: AtomicUsize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples
    ///
    /// The capacity is clamped to `1..=MAX_QUEUE_SAMPLES`.
    pub fn new(capacity: usize) -> Self {
        let clamped = capacity.clamp(1, MAX_QUEUE_SAMPLES);
        if clamped < capacity {
            tracing::debug!(
                "Sample queue of {} samples requested, limited to {}",
                capacity,
                clamped
            );
        }
        Self {
            samples: ArrayQueue::new(clamped),
            gate: Mutex::new(()),
            space: Condvar::new(),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push all of `samples`, waiting for space as needed
    ///
    /// Gives up once `timeout` has elapsed and returns how many samples were
    /// queued; a short count means the consumer has stalled.
    pub fn push_blocking(&self, samples: &[f32], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut pushed = 0;

        while pushed < samples.len() {
            if self.samples.push(samples[pushed]).is_ok() {
                pushed += 1;
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let mut gate = self.gate.lock();
            self.space.wait_until(&mut gate, (now + MAX_PARK).min(deadline));
        }

        pushed
    }

    /// Fill `out` from the queue, padding with silence
    ///
    /// Never blocks. Returns the number of real samples copied.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut copied = 0;
        for slot in out.iter_mut() {
            match self.samples.pop() {
                Some(sample) => {
                    *slot = sample;
                    copied += 1;
                }
                None => break,
            }
        }

        if copied < out.len() {
            out[copied..].fill(0.0);
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        if copied > 0 {
            self.space.notify_one();
        }
        copied
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Callbacks that could not be filled completely
    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a sample queue
pub type SharedSampleQueue = Arc<SampleQueue>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_pop_basic() {
        let queue = SampleQueue::new(8);
        assert_eq!(queue.push_blocking(&[0.1, 0.2, 0.3], Duration::ZERO), 3);
        assert_eq!(queue.len(), 3);

        let mut out = [1.0f32; 2];
        assert_eq!(queue.pop_into(&mut out), 2);
        assert_eq!(out, [0.1, 0.2]);
        assert_eq!(queue.underrun_count(), 0);
    }

    #[test]
    fn test_underrun_pads_with_silence() {
        let queue = SampleQueue::new(8);
        queue.push_blocking(&[0.5], Duration::ZERO);

        let mut out = [1.0f32; 4];
        assert_eq!(queue.pop_into(&mut out), 1);
        assert_eq!(out, [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(queue.underrun_count(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consumer_ignores_producer_gate() {
        let queue = SampleQueue::new(64);
        queue.push_blocking(&[0.25; 32], Duration::ZERO);

        // Producer parked (or about to park) while the callback runs
        let _gate = queue.gate.lock();
        let mut out = [0.0f32; 16];
        assert_eq!(queue.pop_into(&mut out), 16);
        assert_eq!(out, [0.25; 16]);
        assert_eq!(queue.underrun_count(), 0);
        assert_eq!(queue.len(), 16);
    }

    #[test]
    fn test_capacity_is_bounded() {
        // Highest quality setting with a 256-channel stream
        let queue = SampleQueue::new(100_663_296 * 256);
        assert_eq!(queue.capacity(), MAX_QUEUE_SAMPLES);

        assert_eq!(SampleQueue::new(0).capacity(), 1);
        assert_eq!(SampleQueue::new(3072).capacity(), 3072);
    }

    #[test]
    fn test_full_queue_times_out() {
        let queue = SampleQueue::new(4);
        let pushed = queue.push_blocking(&[0.0; 6], Duration::from_millis(20));
        assert_eq!(pushed, 4);
        assert!((queue.fill_level() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_consumer_unblocks_producer() {
        let queue: SharedSampleQueue = Arc::new(SampleQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut drained = 0;
                let mut out = [0.0f32; 2];
                let deadline = Instant::now() + Duration::from_secs(5);
                while drained < 16 && Instant::now() < deadline {
                    drained += queue.pop_into(&mut out);
                    thread::sleep(Duration::from_millis(1));
                }
                drained
            })
        };

        let pushed = queue.push_blocking(&[0.25; 16], Duration::from_secs(5));
        assert_eq!(pushed, 16);
        assert_eq!(consumer.join().unwrap(), 16);
    }
}
