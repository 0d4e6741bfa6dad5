//! Blocking handoff ring buffer for non-real-time producer/consumer pairs.
//!
//! Two counting gates guard a fixed circular store: `free` counts empty slots,
//! `used` counts filled ones. Writers never block; readers sleep until an item
//! arrives. Not for the audio thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Counting semaphore built on parking_lot.
#[derive(Debug)]
struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    fn try_acquire(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cond.wait(&mut count);
        }
        *count -= 1;
    }

    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count == 0 {
            if self.cond.wait_until(&mut count, deadline).timed_out() {
                break;
            }
        }
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    fn release(&self) {
        *self.count.lock() += 1;
        self.cond.notify_one();
    }

    fn available(&self) -> usize {
        *self.count.lock()
    }
}

/// Fixed-size ring with non-blocking writes and blocking reads.
///
/// Intended for a single producer and a single consumer.
pub struct BlockingRingBuffer<T> {
    slots: Box<[Mutex<Option<T>>]>,
    write: AtomicUsize,
    read: AtomicUsize,
    free: Semaphore,
    used: Semaphore,
}

impl<T> BlockingRingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| Mutex::new(None)).collect(),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            free: Semaphore::new(capacity),
            used: Semaphore::new(0),
        }
    }

    /// Write without blocking. Returns false when full.
    pub fn try_write(&self, value: T) -> bool {
        if !self.free.try_acquire() {
            return false;
        }
        let i = self.write.fetch_add(1, Ordering::AcqRel) % self.slots.len();
        *self.slots[i].lock() = Some(value);
        self.used.release();
        true
    }

    /// Block until an item is available.
    pub fn read(&self) -> T {
        loop {
            self.used.acquire();
            if let Some(value) = self.take_slot() {
                return value;
            }
        }
    }

    /// Like [`read`](Self::read) but gives up after `timeout`.
    pub fn read_timeout(&self, timeout: Duration) -> Option<T> {
        if self.used.acquire_timeout(timeout) {
            self.take_slot()
        } else {
            None
        }
    }

    /// Read without blocking.
    pub fn try_read(&self) -> Option<T> {
        if self.used.try_acquire() {
            self.take_slot()
        } else {
            None
        }
    }

    pub fn available_to_read(&self) -> usize {
        self.used.available()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn take_slot(&self) -> Option<T> {
        let i = self.read.fetch_add(1, Ordering::AcqRel) % self.slots.len();
        let value = self.slots[i].lock().take();
        self.free.release();
        value
    }
}
