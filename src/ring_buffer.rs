use std::cell::UnsafeCell;
use std::hint;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Number of slots in a message queue. One slot is always left unused to
/// distinguish empty from full, so 1024 slots hold 1023 outstanding messages.
pub const QUEUE_CAPACITY: usize = 1024;

/// A fixed-capacity single-producer/single-consumer ring buffer.
///
/// `head` is owned by the consumer (next slot to read), `tail` by the
/// producer (next slot to write). Each index lives on its own cache line so
/// the two sides never contend on the same line. The queue is empty iff
/// `head == tail` and full iff `(tail + 1) & (N - 1) == head`.
///
/// Exactly one thread may enqueue and one thread may dequeue at any time.
/// The crate upholds this by keeping the producing end thread-local and by
/// serializing drain passes behind the logger's sink lock.
pub struct RingBuffer<T, const N: usize = QUEUE_CAPACITY> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send + Copy, const N: usize> Sync for RingBuffer<T, N> {}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        assert!(N.is_power_of_two() && N > 1, "capacity must be a power of two");
        let slots = (0..N)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            slots,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Writes `value` into the next free slot and publishes it to the
    /// consumer. Spins while the queue is full: backpressure shows up as
    /// producer latency, never as a dropped message.
    pub fn enqueue(&self, value: T) {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & (N - 1);
        while next == self.head.load(Ordering::Acquire) {
            hint::spin_loop();
        }
        unsafe { (*self.slots[tail].get()).write(value) };
        self.tail.store(next, Ordering::Release);
    }

    /// Copies the oldest slot out of the queue, or returns `None` if the
    /// queue is empty. The release store on `tail` in `enqueue` synchronizes
    /// with the acquire load here, making the slot contents visible.
    pub fn dequeue(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let value = unsafe { (*self.slots[head].get()).assume_init_read() };
        self.head.store((head + 1) & (N - 1), Ordering::Release);
        Some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed) == self.tail.load(Ordering::Acquire)
    }
}

impl<T: Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue() {
        let queue: RingBuffer<u64, 16> = RingBuffer::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_fifo_order() {
        let queue: RingBuffer<u64, 16> = RingBuffer::new();
        for i in 0..10 {
            queue.enqueue(i);
        }
        for i in 0..10 {
            assert_eq!(queue.dequeue(), Some(i), "values must come out in enqueue order");
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let queue: RingBuffer<u64, 8> = RingBuffer::new();
        // Cycle through the slots several times to exercise index wrapping.
        for round in 0..5u64 {
            for i in 0..7 {
                queue.enqueue(round * 7 + i);
            }
            for i in 0..7 {
                assert_eq!(queue.dequeue(), Some(round * 7 + i));
            }
        }
    }

    #[test]
    fn test_holds_capacity_minus_one() {
        let queue: RingBuffer<u32, 1024> = RingBuffer::new();
        for i in 0..1023 {
            queue.enqueue(i);
        }
        let mut drained = 0;
        while queue.dequeue().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 1023, "a 1024-slot queue holds exactly 1023 messages");
    }
}
