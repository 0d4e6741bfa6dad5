//! Lock-free primitives shared between the audio thread and the control thread.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub const fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }

    /// Read and clear in one step.
    #[inline]
    pub fn take(&self) -> bool {
        self.swap(false)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Cache-line aligned event counter.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicCounter {
    value: AtomicUsize,
}

impl AtomicCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    /// Read and reset to zero.
    #[inline]
    pub fn take(&self) -> usize {
        self.value.swap(0, Ordering::AcqRel)
    }
}

/// Cache-line aligned signed value (global transpose).
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct AtomicSemitones {
    value: AtomicI32,
}

impl AtomicSemitones {
    pub const fn new(value: i32) -> Self {
        Self {
            value: AtomicI32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: i32) {
        self.value.store(value, Ordering::Release);
    }
}
