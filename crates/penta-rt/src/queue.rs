//! Bounded lock-free bridge between the RT and telemetry domains.
//!
//! The producer side lives on the audio callback and must never wait: when
//! the queue is full, [`RtProducer::push`] displaces the *oldest* element
//! and counts the loss, so the freshest estimates always get through and
//! back-pressure can never reach the RT thread. Consumers observe losses
//! through the shared drop counter and through gaps in message sequence
//! numbers.
//!
//! Payloads are expected to be small `Copy` records; displacement drops
//! them on the producer's thread without running any user code.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared<T> {
    queue: ArrayQueue<T>,
    dropped: AtomicU64,
}

/// Create a bounded drop-oldest channel.
///
/// `capacity` must be non-zero.
pub fn rt_channel<T>(capacity: usize) -> (RtProducer<T>, RtConsumer<T>) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(capacity),
        dropped: AtomicU64::new(0),
    });
    (
        RtProducer {
            shared: Arc::clone(&shared),
        },
        RtConsumer { shared },
    )
}

/// Sending half. Cloning is cheap and sound (the underlying queue is
/// multi-producer safe), but the intended topology is one producer on the
/// RT thread.
pub struct RtProducer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RtProducer<T> {
    /// Push, displacing the oldest element when full. Never blocks, never
    /// fails.
    #[inline]
    pub fn push(&self, value: T) {
        if self.shared.queue.force_push(value).is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Total elements displaced since creation.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Clone for RtProducer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Receiving half, owned by the telemetry thread.
pub struct RtConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RtConsumer<T> {
    #[inline]
    pub fn pop(&self) -> Option<T> {
        self.shared.queue.pop()
    }

    /// Pop everything currently queued, in FIFO order. Returns the number
    /// of elements handed to `f`.
    pub fn drain<F: FnMut(T)>(&self, mut f: F) -> usize {
        let mut count = 0;
        while let Some(value) = self.shared.queue.pop() {
            f(value);
            count += 1;
        }
        count
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Total elements displaced since creation.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_under_capacity() {
        let (tx, rx) = rt_channel(8);
        for i in 0..5u32 {
            tx.push(i);
        }
        assert_eq!(rx.len(), 5);
        for i in 0..5u32 {
            assert_eq!(rx.pop(), Some(i));
        }
        assert_eq!(rx.pop(), None);
        assert_eq!(rx.dropped(), 0);
    }

    #[test]
    fn test_overflow_keeps_newest() {
        let capacity = 4;
        let (tx, rx) = rt_channel(capacity);
        for i in 0..10u32 {
            tx.push(i);
        }
        // Exactly `capacity` newest survive, in order.
        let mut survivors = Vec::new();
        rx.drain(|v| survivors.push(v));
        assert_eq!(survivors, vec![6, 7, 8, 9]);
        assert_eq!(rx.dropped(), 6);
    }

    #[test]
    fn test_drain_empties() {
        let (tx, rx) = rt_channel(4);
        tx.push(1u32);
        tx.push(2);
        let mut seen = Vec::new();
        let n = rx.drain(|v| seen.push(v));
        assert_eq!(n, 2);
        assert_eq!(seen, vec![1, 2]);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_concurrent_accounting() {
        // Every pushed element is either popped or counted as dropped.
        const PUSHES: u64 = 50_000;
        let (tx, rx) = rt_channel(32);

        let producer = thread::spawn(move || {
            for i in 0..PUSHES {
                tx.push(i);
            }
            tx.dropped()
        });

        let mut popped: u64 = 0;
        let mut last: Option<u64> = None;
        loop {
            match rx.pop() {
                Some(v) => {
                    // FIFO order survives displacement: values only grow.
                    if let Some(prev) = last {
                        assert!(v > prev);
                    }
                    last = Some(v);
                    popped += 1;
                }
                None => {
                    if producer.is_finished() {
                        break;
                    }
                    thread::yield_now();
                }
            }
        }
        producer.join().unwrap();
        popped += rx.drain(|_| ()) as u64;
        assert_eq!(popped + rx.dropped(), PUSHES);
    }
}
