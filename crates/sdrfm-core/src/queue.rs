// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded FIFO block queue (spec.md §3 DATA MODEL, §5 CONCURRENCY).
//!
//! The teacher's pipeline (`trx-backend-soapysdr::dsp::SdrPipeline`) hands
//! blocks between threads with `tokio::sync::broadcast` channels, which drop
//! the oldest entry under backpressure rather than block the producer. The
//! spec asks for the opposite: a backpressure-blocking bounded queue with an
//! explicit `queued_samples` counter and an `end_of_stream` latch, so this
//! is grounded instead on the lock+condvar discipline the teacher applies
//! elsewhere for cross-thread handoff (`RigHandle`'s mutex-guarded state),
//! generalized into a dedicated queue type.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner<T> {
    blocks: VecDeque<T>,
    queued_samples: usize,
    end_of_stream: bool,
}

/// A bounded FIFO of blocks guarded by a lock and a condition variable.
///
/// `T` is a block type exposing a sample count via the `len` closure given
/// at construction time, since IQ blocks and audio blocks count samples
/// differently (complex pairs vs. scalars) but the queue discipline is the
/// same for both.
pub struct BoundedBlockQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity_samples: usize,
    len_of: fn(&T) -> usize,
}

impl<T> BoundedBlockQueue<T> {
    pub fn new(capacity_samples: usize, len_of: fn(&T) -> usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                blocks: VecDeque::new(),
                queued_samples: 0,
                end_of_stream: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity_samples,
            len_of,
        }
    }

    /// Push a block, blocking while the queue is at or above capacity and
    /// the stream has not ended. Returns `false` if `end_of_stream` was set
    /// while waiting (the block is dropped, the caller should stop pushing).
    pub fn push(&self, block: T) -> bool {
        let mut guard = self.inner.lock().unwrap();
        while guard.queued_samples >= self.capacity_samples && !guard.end_of_stream {
            guard = self.not_full.wait(guard).unwrap();
        }
        if guard.end_of_stream {
            return false;
        }
        guard.queued_samples += (self.len_of)(&block);
        guard.blocks.push_back(block);
        self.not_empty.notify_one();
        true
    }

    /// Pop the next block, blocking until one is available or the stream
    /// has ended with the queue drained (returns `None` in that case).
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(block) = guard.blocks.pop_front() {
                guard.queued_samples = guard.queued_samples.saturating_sub((self.len_of)(&block));
                self.not_full.notify_one();
                return Some(block);
            }
            if guard.end_of_stream {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    /// Latch `end_of_stream` and wake every waiter so producers unblock from
    /// `push` and consumers unblock from `pop`/`wait_until_at_least` once the
    /// queue drains.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.end_of_stream = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().end_of_stream
    }

    pub fn queued_samples(&self) -> usize {
        self.inner.lock().unwrap().queued_samples
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block the caller until at least `n` samples are queued, or the stream
    /// has ended. Used by a consumer-side meter that wants to read a steady
    /// chunk size regardless of producer block boundaries.
    pub fn wait_until_at_least(&self, n: usize) {
        let guard = self.inner.lock().unwrap();
        let _unused = self
            .not_empty
            .wait_while(guard, |g| g.queued_samples < n && !g.end_of_stream)
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn len_of_vec(v: &Vec<i32>) -> usize {
        v.len()
    }

    #[test]
    fn push_then_pop_preserves_fifo_order() {
        let q: BoundedBlockQueue<Vec<i32>> = BoundedBlockQueue::new(1024, len_of_vec);
        assert!(q.push(vec![1, 2, 3]));
        assert!(q.push(vec![4, 5]));
        assert_eq!(q.pop(), Some(vec![1, 2, 3]));
        assert_eq!(q.pop(), Some(vec![4, 5]));
    }

    #[test]
    fn queued_samples_tracks_pushes_and_pops() {
        let q: BoundedBlockQueue<Vec<i32>> = BoundedBlockQueue::new(1024, len_of_vec);
        q.push(vec![0; 10]);
        assert_eq!(q.queued_samples(), 10);
        q.push(vec![0; 5]);
        assert_eq!(q.queued_samples(), 15);
        q.pop();
        assert_eq!(q.queued_samples(), 5);
    }

    #[test]
    fn close_unblocks_pop_once_drained() {
        let q: BoundedBlockQueue<Vec<i32>> = BoundedBlockQueue::new(1024, len_of_vec);
        q.push(vec![1]);
        q.close();
        assert_eq!(q.pop(), Some(vec![1]));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn close_unblocks_a_pending_push_at_capacity() {
        let q: Arc<BoundedBlockQueue<Vec<i32>>> = Arc::new(BoundedBlockQueue::new(4, len_of_vec));
        q.push(vec![0; 4]);
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.push(vec![0; 4]));
        thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap(), false);
    }

    #[test]
    fn wait_until_at_least_returns_once_threshold_reached() {
        let q: Arc<BoundedBlockQueue<Vec<i32>>> = Arc::new(BoundedBlockQueue::new(1024, len_of_vec));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            q2.push(vec![0; 100]);
        });
        q.wait_until_at_least(50);
        assert!(q.queued_samples() >= 50);
        handle.join().unwrap();
    }

    #[test]
    fn wait_until_at_least_returns_on_end_of_stream_even_if_below_threshold() {
        let q: Arc<BoundedBlockQueue<Vec<i32>>> = Arc::new(BoundedBlockQueue::new(1024, len_of_vec));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(10));
            q2.close();
        });
        q.wait_until_at_least(1_000_000);
        handle.join().unwrap();
    }
}
