//! Two-phase stash/commit ring buffer.
//!
//! ```text
//!  producer (audio thread)              consumer (control thread)
//!  stash() stash() ... commit() ──┐   ┌── start_read() read_next()... end_read()
//!                                 ▼   ▼
//!                     Mutex { read_end, write_end }
//! ```
//!
//! The producer writes slots privately and publishes them in one step with
//! [`StashProducer::commit`]. The consumer only ever sees whole commits. The
//! mutex guards two indices and is held for a few instructions, never during
//! a copy.

use std::cell::UnsafeCell;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug)]
struct Watermarks {
    /// End of the committed region (exclusive). Written by the producer.
    read_end: usize,
    /// First slot the consumer has not released. Written by the consumer.
    write_end: usize,
}

struct Shared<T> {
    slots: Box<[UnsafeCell<T>]>,
    marks: Mutex<Watermarks>,
}

// SAFETY: a slot is written only by the producer while it lies outside the
// consumer's committed range, and read only by the consumer while it lies
// inside it. The ranges are exchanged under `marks`, so they never overlap.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn incr(&self, i: usize) -> usize {
        let next = i + 1;
        if next >= self.slots.len() {
            0
        } else {
            next
        }
    }
}

/// Create a stash buffer holding up to `capacity` uncommitted + unread items.
pub fn stash_buffer<T: Copy + Default + Send>(
    capacity: usize,
) -> (StashProducer<T>, StashConsumer<T>) {
    // One slot stays empty to tell full from empty.
    let size = capacity.max(1) + 1;
    let slots = (0..size)
        .map(|_| UnsafeCell::new(T::default()))
        .collect::<Vec<_>>()
        .into_boxed_slice();
    let shared = Arc::new(Shared {
        slots,
        marks: Mutex::new(Watermarks {
            read_end: 0,
            write_end: 0,
        }),
    });

    (
        StashProducer {
            shared: Arc::clone(&shared),
            write: 0,
            write_end: 0,
            stashed: false,
        },
        StashConsumer {
            shared,
            read: 0,
            read_end: 0,
        },
    )
}

/// Writing half. Lives on the audio thread.
pub struct StashProducer<T> {
    shared: Arc<Shared<T>>,
    write: usize,
    /// Consumer position as of the last commit.
    write_end: usize,
    stashed: bool,
}

impl<T: Copy> StashProducer<T> {
    /// Stash `value` for the next commit. Returns false when full. RT-safe.
    #[inline]
    pub fn stash(&mut self, value: T) -> bool {
        let next = self.shared.incr(self.write);
        if next == self.write_end {
            return false;
        }
        // SAFETY: `write` is outside the consumer's range [read, read_end)
        // because `write_end` trails the consumer's released position.
        unsafe {
            *self.shared.slots[self.write].get() = value;
        }
        self.write = next;
        self.stashed = true;
        true
    }

    /// Publish everything stashed since the last commit.
    ///
    /// Returns whether anything was stashed. RT-safe (short critical section).
    pub fn commit(&mut self) -> bool {
        {
            let mut marks = self.shared.marks.lock();
            marks.read_end = self.write;
            self.write_end = marks.write_end;
        }
        std::mem::replace(&mut self.stashed, false)
    }

    /// Items stashed but not yet visible to the consumer are not counted.
    pub fn capacity(&self) -> usize {
        self.shared.slots.len() - 1
    }
}

/// Reading half. Lives on the control thread.
pub struct StashConsumer<T> {
    shared: Arc<Shared<T>>,
    read: usize,
    read_end: usize,
}

impl<T: Copy> StashConsumer<T> {
    /// Snapshot the committed watermark.
    pub fn start_read(&mut self) {
        self.read_end = self.shared.marks.lock().read_end;
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.read != self.read_end
    }

    /// Next item up to the snapshot taken by [`start_read`](Self::start_read).
    #[inline]
    pub fn read_next(&mut self) -> Option<T> {
        if !self.has_next() {
            return None;
        }
        // SAFETY: `read` is inside [read, read_end), committed by the producer
        // and not released back to it until `end_read`.
        let value = unsafe { *self.shared.slots[self.read].get() };
        self.read = self.shared.incr(self.read);
        Some(value)
    }

    /// Release consumed slots back to the producer.
    pub fn end_read(&mut self) {
        self.shared.marks.lock().write_end = self.read;
    }

    /// `start_read` + drain + `end_read`, appending to `out`. Returns the count.
    pub fn read_into(&mut self, out: &mut Vec<T>) -> usize {
        self.start_read();
        let before = out.len();
        while let Some(value) = self.read_next() {
            out.push(value);
        }
        self.end_read();
        out.len() - before
    }

    pub fn read_all(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        self.read_into(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_visible_before_commit() {
        let (mut tx, mut rx) = stash_buffer::<u32>(8);
        assert!(tx.stash(1));
        assert!(tx.stash(2));
        assert!(rx.read_all().is_empty());

        assert!(tx.commit());
        assert_eq!(rx.read_all(), vec![1, 2]);
        assert!(!tx.commit());
    }

    #[test]
    fn test_stashed_after_commit_waits_for_next_commit() {
        let (mut tx, mut rx) = stash_buffer::<u32>(8);
        tx.stash(1);
        tx.commit();
        tx.stash(2);

        rx.start_read();
        assert_eq!(rx.read_next(), Some(1));
        assert!(!rx.has_next());
        assert_eq!(rx.read_next(), None);
        rx.end_read();

        tx.commit();
        assert_eq!(rx.read_all(), vec![2]);
    }

    #[test]
    fn test_full_returns_false() {
        let (mut tx, mut rx) = stash_buffer::<u32>(3);
        assert_eq!(tx.capacity(), 3);
        assert!(tx.stash(1));
        assert!(tx.stash(2));
        assert!(tx.stash(3));
        assert!(!tx.stash(4));
        tx.commit();
        assert_eq!(rx.read_all(), vec![1, 2, 3]);
    }

    #[test]
    fn test_space_reclaimed_after_next_commit() {
        let (mut tx, mut rx) = stash_buffer::<u32>(2);
        tx.stash(1);
        tx.stash(2);
        tx.commit();
        assert_eq!(rx.read_all(), vec![1, 2]);

        // The producer learns about released slots on commit.
        assert!(!tx.stash(3));
        tx.commit();
        assert!(tx.stash(3));
        assert!(tx.stash(4));
        tx.commit();
        assert_eq!(rx.read_all(), vec![3, 4]);
    }

    #[test]
    fn test_wraparound_many_cycles() {
        let (mut tx, mut rx) = stash_buffer::<u32>(5);
        let mut expected = 0;
        let mut next = 0;
        for _ in 0..50 {
            for _ in 0..3 {
                if tx.stash(next) {
                    next += 1;
                }
            }
            tx.commit();
            for v in rx.read_all() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        assert!(expected > 100);
    }

    #[test]
    fn test_cross_thread() {
        let (mut tx, mut rx) = stash_buffer::<u64>(64);
        let handle = std::thread::spawn(move || {
            let mut sent = 0u64;
            while sent < 1000 {
                while sent < 1000 && tx.stash(sent) {
                    sent += 1;
                }
                tx.commit();
                std::thread::yield_now();
            }
        });

        let mut got = Vec::new();
        while got.len() < 1000 {
            rx.read_into(&mut got);
            std::thread::yield_now();
        }
        handle.join().unwrap();
        assert!(got.iter().copied().eq(0..1000));
    }
}
