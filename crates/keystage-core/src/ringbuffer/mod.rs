//! Cross-thread event buffers.
//!
//! - [`stash_buffer`]: audio thread -> control thread, two-phase stash/commit
//! - [`BlockingRingBuffer`]: control thread -> listener, blocking reads

mod blocking;
mod stash;

pub use blocking::BlockingRingBuffer;
pub use stash::{stash_buffer, StashConsumer, StashProducer};
