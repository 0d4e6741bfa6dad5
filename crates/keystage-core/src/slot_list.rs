//! Fixed-capacity slot list for the audio thread.
//!
//! ```text
//! order:   [ 3  0  5 | 1  2  4 ... ]
//!            used      free stack
//!              count ─┘
//! storage: [ T  T  T  T  T  T ... ]
//! ```
//!
//! `order[..count]` are the storage slots in use, `order[count..]` the free
//! ones. Removing swaps the last used entry into the hole, so the freed
//! storage slot becomes the top of the free stack and the next `add` reuses it.

/// Allocation-free list with O(1) add and remove-by-index.
#[derive(Clone, Debug)]
pub struct SlotList<T: Copy + Default, const N: usize> {
    storage: [T; N],
    order: [usize; N],
    count: usize,
}

impl<T: Copy + Default, const N: usize> SlotList<T, N> {
    pub fn new() -> Self {
        let mut order = [0usize; N];
        for (i, slot) in order.iter_mut().enumerate() {
            *slot = i;
        }
        Self {
            storage: [T::default(); N],
            order,
            count: 0,
        }
    }

    /// Append `item`. Returns false when full.
    #[inline]
    pub fn add(&mut self, item: T) -> bool {
        if self.count >= N {
            return false;
        }
        self.storage[self.order[self.count]] = item;
        self.count += 1;
        true
    }

    /// Item at logical `index`.
    ///
    /// # Panics
    ///
    /// If `index >= count()`.
    #[inline]
    pub fn at(&self, index: usize) -> &T {
        self.check(index);
        &self.storage[self.order[index]]
    }

    /// # Panics
    ///
    /// If `index >= count()`.
    #[inline]
    pub fn at_mut(&mut self, index: usize) -> &mut T {
        self.check(index);
        &mut self.storage[self.order[index]]
    }

    /// Remove the item at `index`; the last item takes its place.
    ///
    /// # Panics
    ///
    /// If `index >= count()`.
    #[inline]
    pub fn remove(&mut self, index: usize) -> T {
        self.check(index);
        let item = self.storage[self.order[index]];
        self.count -= 1;
        self.order.swap(index, self.count);
        item
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count == N
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop all items without touching storage.
    #[inline]
    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.order[..self.count].iter().map(|&i| &self.storage[i])
    }

    #[inline]
    fn check(&self, index: usize) {
        if index >= self.count {
            panic!(
                "SlotList index {} out of range (count {})",
                index, self.count
            );
        }
    }
}

impl<T: Copy + Default, const N: usize> Default for SlotList<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
