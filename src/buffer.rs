// SPDX-License-Identifier: Apache-2.0

//! Double-buffered stream pair for cross-thread frame handoff.
//!
//! Each sensor stream owns a [`StreamPair`]: a *front* buffer visible to the
//! consumer and a *back* buffer filled by the acquisition loop. The two never
//! alias; publishing a frame is an O(1) exchange of the underlying vector
//! handles, never a data copy.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    StreamPair<T>                    │
//! │  ┌───────────────┐          ┌───────────────┐       │
//! │  │  back         │   swap   │  front        │       │
//! │  │  (producer)   │   ←──→   │  (consumer)   │       │
//! │  └───────────────┘          └───────────────┘       │
//! │            needs_publish: AtomicBool                │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The producer fills and marks frames through [`StreamPair::produce`]; the
//! consumer publishes with [`StreamPair::try_swap`] and reads through
//! [`StreamPair::read_front`]. Prior to the first swap the front buffer is
//! zero-initialized at the stream's full size, so readers always observe a
//! well-defined frame.
//!
//! The needs-publish flag only changes while the back-buffer lock is held,
//! which maintains the invariant that the flag is `true` exactly when the
//! back buffer holds a complete, unpublished frame. [`StreamPair::try_swap`]
//! uses `try_lock` on the back buffer, so the consumer never waits for an
//! in-flight producer write; a frame that is still being filled is simply
//! published on the next cycle.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::sensor::Error;

/// Front/back buffer pair with an atomic needs-publish flag.
///
/// # Thread safety
///
/// `StreamPair` supports exactly one producer (the acquisition loop) and one
/// consumer (the publish/update step plus readers on the consumer thread).
/// The producer only ever locks `back`; the consumer locks `front`, and both
/// only during [`Self::try_swap`], always in front-then-back order.
#[derive(Debug)]
pub struct StreamPair<T> {
    front: Mutex<Vec<T>>,
    back: Mutex<Vec<T>>,
    needs_publish: AtomicBool,
    frame_new: AtomicBool,
    len: usize,
}

impl<T: Clone + Default> StreamPair<T> {
    /// Create a pair of equally-sized, zero-initialized buffers.
    ///
    /// Memory is allocated once here; steady-state operation never
    /// reallocates.
    pub fn new(len: usize) -> Self {
        Self {
            front: Mutex::new(vec![T::default(); len]),
            back: Mutex::new(vec![T::default(); len]),
            needs_publish: AtomicBool::new(false),
            frame_new: AtomicBool::new(false),
            len,
        }
    }
}

impl<T> StreamPair<T> {
    /// Element count of each buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for zero-sized streams.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Producer-only: fill the back buffer.
    ///
    /// `fill` returns `Ok(true)` when it wrote a complete frame, in which
    /// case the frame is marked for publication before the buffer lock is
    /// released. `Ok(false)` (no data this tick) and `Err` leave the pending
    /// state unchanged.
    pub fn produce(&self, fill: impl FnOnce(&mut [T]) -> Result<bool, Error>) -> Result<bool, Error> {
        let mut back = self.back.lock().unwrap();
        let fresh = fill(&mut back)?;
        if fresh {
            self.needs_publish.store(true, Ordering::Release);
        }
        Ok(fresh)
    }

    /// Whether a complete back-buffer frame is awaiting publication.
    #[inline]
    pub fn needs_publish(&self) -> bool {
        self.needs_publish.load(Ordering::Acquire)
    }

    /// Consumer-only: publish the back buffer if a complete frame is pending.
    ///
    /// Exchanges the front and back vector handles in O(1) and records
    /// whether this cycle actually produced a new frame (see
    /// [`Self::is_frame_new`]). The back lock is only tried, never waited
    /// on: if the producer is mid-write the swap is deferred to the next
    /// consumer cycle. The flag is cleared with the back lock held, before
    /// the exchange, so it is never observed `true` while a swap is
    /// mid-flight.
    ///
    /// Returns `true` if a swap occurred.
    pub fn try_swap(&self) -> bool {
        let mut front = self.front.lock().unwrap();
        let Ok(mut back) = self.back.try_lock() else {
            self.frame_new.store(false, Ordering::Release);
            return false;
        };

        if !self.needs_publish.swap(false, Ordering::AcqRel) {
            self.frame_new.store(false, Ordering::Release);
            return false;
        }

        std::mem::swap(&mut *front, &mut *back);
        self.frame_new.store(true, Ordering::Release);
        true
    }

    /// Whether the most recent [`Self::try_swap`] published a new frame.
    #[inline]
    pub fn is_frame_new(&self) -> bool {
        self.frame_new.load(Ordering::Acquire)
    }

    /// Consumer-only: scoped borrow of the current front buffer.
    ///
    /// Always valid; before the first swap this is the zero-initialized
    /// frame. The guard must not be retained across a call to
    /// [`Self::try_swap`].
    pub fn read_front(&self) -> FrontGuard<'_, T> {
        FrontGuard {
            guard: Some(self.front.lock().unwrap()),
        }
    }
}

impl<T: Clone> StreamPair<T> {
    /// Consumer-only: owned copy of the current front buffer.
    pub fn snapshot(&self) -> Vec<T> {
        self.front.lock().unwrap().clone()
    }
}

/// Scoped read access to a stream's front buffer.
///
/// Dereferences to the pixel slice. An [`FrontGuard::empty`] guard (for
/// streams that were never initialized) dereferences to a zero-length slice
/// rather than failing, so consumers can query unconditionally.
pub struct FrontGuard<'a, T> {
    guard: Option<MutexGuard<'a, Vec<T>>>,
}

impl<T> FrontGuard<'_, T> {
    /// A guard over no data at all (uninitialized stream).
    pub fn empty() -> Self {
        Self { guard: None }
    }
}

impl<T> Deref for FrontGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match &self.guard {
            Some(guard) => guard.as_slice(),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fill_with<T: Copy>(value: T) -> impl FnOnce(&mut [T]) -> Result<bool, Error> {
        move |buf: &mut [T]| {
            buf.fill(value);
            Ok(true)
        }
    }

    #[test]
    fn test_zero_initialized_before_first_swap() {
        let pair: StreamPair<u16> = StreamPair::new(16);
        assert_eq!(pair.len(), 16);
        assert!(!pair.needs_publish());
        assert_eq!(&*pair.read_front(), &[0u16; 16]);
    }

    #[test]
    fn test_swap_publishes_back_contents() {
        let pair: StreamPair<u16> = StreamPair::new(4);
        pair.produce(|buf| {
            buf.copy_from_slice(&[1, 2, 3, 4]);
            Ok(true)
        })
        .unwrap();

        assert!(pair.needs_publish());
        assert!(pair.try_swap());
        assert!(pair.is_frame_new());
        assert_eq!(&*pair.read_front(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_incomplete_produce_does_not_publish() {
        let pair: StreamPair<u8> = StreamPair::new(2);
        pair.produce(|buf| {
            buf[0] = 9;
            Ok(false)
        })
        .unwrap();

        assert!(!pair.needs_publish());
        assert!(!pair.try_swap());
        assert_eq!(&*pair.read_front(), &[0, 0]);
    }

    #[test]
    fn test_swap_idempotent_without_new_data() {
        let pair: StreamPair<u8> = StreamPair::new(3);
        pair.produce(fill_with(7)).unwrap();
        assert!(pair.try_swap());

        // No new frame: front must stay byte-identical.
        let before = pair.snapshot();
        assert!(!pair.try_swap());
        assert!(!pair.is_frame_new());
        assert_eq!(pair.snapshot(), before);
    }

    #[test]
    fn test_front_never_rolls_back() {
        let pair: StreamPair<u8> = StreamPair::new(1);

        pair.produce(fill_with(1)).unwrap();
        pair.try_swap();
        assert_eq!(pair.read_front()[0], 1);

        pair.produce(fill_with(2)).unwrap();
        pair.try_swap();
        assert_eq!(pair.read_front()[0], 2);

        // A stale cycle leaves the newest frame in place.
        assert!(!pair.try_swap());
        assert_eq!(pair.read_front()[0], 2);
    }

    #[test]
    fn test_produce_error_leaves_state_unchanged() {
        let pair: StreamPair<u8> = StreamPair::new(1);
        let err = pair.produce(|_| Err(Error::MappingUnavailable));
        assert!(err.is_err());
        assert!(!pair.needs_publish());
    }

    #[test]
    fn test_empty_guard() {
        let guard: FrontGuard<'_, u16> = FrontGuard::empty();
        assert!(guard.is_empty());
    }

    #[test]
    fn test_concurrent_producer_consumer_integrity() {
        // The consumer must only ever observe fully-written frames: every
        // published buffer holds a single repeated sequence number, and
        // sequence numbers never go backwards.
        let pair: Arc<StreamPair<u32>> = Arc::new(StreamPair::new(64));
        let producer_pair = Arc::clone(&pair);

        let producer = std::thread::spawn(move || {
            for seq in 1..=500u32 {
                producer_pair.produce(fill_with(seq)).unwrap();
            }
        });

        let mut last_seen = 0u32;
        loop {
            if pair.try_swap() {
                let front = pair.read_front();
                let first = front[0];
                assert!(front.iter().all(|&v| v == first), "torn frame observed");
                assert!(first >= last_seen, "front buffer rolled back");
                last_seen = first;
            }
            if last_seen == 500 {
                break;
            }
            if producer.is_finished() && !pair.needs_publish() && last_seen > 0 {
                // Everything the producer wrote has been published, so the
                // newest frame must be the last one.
                assert_eq!(last_seen, 500);
                break;
            }
            std::thread::yield_now();
        }

        producer.join().unwrap();
    }
}
