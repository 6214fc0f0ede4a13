//! Lock-free SPSC Ring Buffer
//!
//! Thin typed wrapper over `rtrb` used for every cross-thread handoff in the
//! pipeline: captured audio blocks, magnitude frames and rendered paths.
//!
//! The producer and consumer halves are separate owned values and neither is
//! `Clone`, so "exactly one writer, exactly one reader" is enforced by the type
//! system rather than by convention. Capacity is fixed at construction.

use rtrb::{Consumer, Producer, PushError, RingBuffer};

/// Create a bounded queue holding at most `capacity` items
///
/// # Panics
/// Panics if `capacity` is zero.
pub fn ring_buffer<T>(capacity: usize) -> (RingProducer<T>, RingConsumer<T>) {
    assert!(capacity > 0, "ring buffer capacity must be greater than zero");
    let (producer, consumer) = RingBuffer::<T>::new(capacity);
    (RingProducer { inner: producer }, RingConsumer { inner: consumer })
}

/// Writing half; owned by exactly one thread
pub struct RingProducer<T> {
    inner: Producer<T>,
}

impl<T> RingProducer<T> {
    /// Push without blocking
    ///
    /// A full queue is a normal outcome under load: the value is handed back
    /// in `Err` and nothing already queued is touched.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        self.inner.push(value).map_err(|PushError::Full(value)| value)
    }

    /// Free slots (may grow concurrently as the consumer pops)
    #[inline]
    pub fn available_for_write(&self) -> usize {
        self.inner.slots()
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }
}

/// Reading half; owned by exactly one thread
pub struct RingConsumer<T> {
    inner: Consumer<T>,
}

impl<T> RingConsumer<T> {
    /// Pop the oldest item, or `None` if nothing is queued
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        self.inner.pop().ok()
    }

    /// Queued items (may grow concurrently as the producer pushes)
    #[inline]
    pub fn available_for_read(&self) -> usize {
        self.inner.slots()
    }

    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }

    /// Pop everything currently queued and keep only the newest item
    pub fn drain_latest(&mut self) -> Option<T> {
        let mut latest = None;
        while let Some(value) = self.try_pop() {
            latest = Some(value);
        }
        latest
    }
}
