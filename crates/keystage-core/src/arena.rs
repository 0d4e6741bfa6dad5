//! Generational arena with typed handles.
//!
//! Ports, routes and synth slots refer to each other by handle instead of by
//! reference. Removing an entry bumps its generation, so stale handles simply
//! stop resolving.

use core::fmt;
use core::marker::PhantomData;

/// Untyped slot index + generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    pub(crate) const PLACEHOLDER: RawHandle = RawHandle {
        index: u32::MAX,
        generation: u32::MAX,
    };

    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Typed wrapper around a [`RawHandle`]. Implemented by `define_handle!`.
pub trait ArenaHandle: Copy {
    fn from_raw(raw: RawHandle) -> Self;
    fn raw(self) -> RawHandle;
}

#[derive(Debug)]
enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slot storage addressed by handles of type `H`.
///
/// Insertion may allocate and belongs on the control thread. Lookup and
/// iteration never allocate.
#[derive(Debug)]
pub struct Arena<H, T> {
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    len: usize,
    _handle: PhantomData<fn() -> H>,
}

impl<H: ArenaHandle, T> Arena<H, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_head: None,
            len: 0,
            _handle: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> H {
        self.len += 1;
        if let Some(index) = self.free_head {
            let entry = &mut self.entries[index as usize];
            let (generation, next_free) = match *entry {
                Entry::Vacant {
                    generation,
                    next_free,
                } => (generation, next_free),
                Entry::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            *entry = Entry::Occupied { generation, value };
            self.free_head = next_free;
            return H::from_raw(RawHandle { index, generation });
        }

        let index = self.entries.len() as u32;
        self.entries.push(Entry::Occupied {
            generation: 0,
            value,
        });
        H::from_raw(RawHandle {
            index,
            generation: 0,
        })
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        let raw = handle.raw();
        let entry = self.entries.get_mut(raw.index())?;
        let generation = match entry {
            Entry::Occupied { generation, .. } if *generation == raw.generation => *generation,
            _ => return None,
        };
        let old = core::mem::replace(
            entry,
            Entry::Vacant {
                generation: generation.wrapping_add(1),
                next_free: self.free_head,
            },
        );
        self.free_head = Some(raw.index);
        self.len -= 1;
        match old {
            Entry::Occupied { value, .. } => Some(value),
            Entry::Vacant { .. } => None,
        }
    }

    #[inline]
    pub fn get(&self, handle: H) -> Option<&T> {
        let raw = handle.raw();
        match self.entries.get(raw.index())? {
            Entry::Occupied { generation, value } if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let raw = handle.raw();
        match self.entries.get_mut(raw.index())? {
            Entry::Occupied { generation, value } if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    /// Shared access to `a` and exclusive access to `b`. `None` if either is
    /// missing or both name the same slot.
    pub fn get_ref_mut(&mut self, a: H, b: H) -> Option<(&T, &mut T)> {
        let (ra, rb) = (a.raw(), b.raw());
        if ra.index == rb.index || self.get(a).is_none() || self.get(b).is_none() {
            return None;
        }

        let (ia, ib) = (ra.index(), rb.index());
        let (first, second) = if ia < ib {
            let (lo, hi) = self.entries.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = self.entries.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        };
        match (first, second) {
            (Entry::Occupied { value: va, .. }, Entry::Occupied { value: vb, .. }) => {
                Some((&*va, vb))
            }
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    H::from_raw(RawHandle {
                        index: i as u32,
                        generation: *generation,
                    }),
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> + '_ {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, entry)| match entry {
                Entry::Occupied { generation, value } => Some((
                    H::from_raw(RawHandle {
                        index: i as u32,
                        generation: *generation,
                    }),
                    value,
                )),
                Entry::Vacant { .. } => None,
            })
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.iter_mut().map(|(_, v)| v)
    }

    pub fn handles(&self) -> Vec<H> {
        self.iter().map(|(h, _)| h).collect()
    }
}

impl<H: ArenaHandle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Self::new()
    }
}
