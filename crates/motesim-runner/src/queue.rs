//! Binary min-heap of events ordered by virtual time.
//!
//! Events with equal times pop in insertion order: the heap key is the pair
//! `(time, sequence)`, where `sequence` counts insertions.

use motesim_common::SimTime;

/// Logical capacity of a fresh queue.
pub const INITIAL_CAPACITY: usize = 511;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: SimTime,
    sequence: u64,
}

#[derive(Debug)]
struct HeapEntry<E> {
    key: EventKey,
    event: E,
}

/// Min-heap of pending events.
///
/// Capacity grows to `capacity * 2 + 1` when an insert finds the heap full
/// and never shrinks.
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: Vec<HeapEntry<E>>,
    capacity: usize,
    next_sequence: u64,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        EventQueue {
            heap: Vec::with_capacity(INITIAL_CAPACITY),
            capacity: INITIAL_CAPACITY,
            next_sequence: 0,
        }
    }

    /// Insert `event` to fire at `time`. O(log n).
    pub fn insert(&mut self, event: E, time: SimTime) {
        if self.heap.len() == self.capacity {
            let grown = self.capacity * 2 + 1;
            self.heap.reserve_exact(grown - self.heap.len());
            self.capacity = grown;
        }

        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.heap.push(HeapEntry { key, event });
        self.sift_up(self.heap.len() - 1);
    }

    /// Remove and return the earliest event with its time. O(log n).
    pub fn pop_min_with_time(&mut self) -> Option<(SimTime, E)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let entry = self.heap.pop()?;
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((entry.key.time, entry.event))
    }

    /// Remove and return the earliest event.
    pub fn pop_min(&mut self) -> Option<E> {
        self.pop_min_with_time().map(|(_, e)| e)
    }

    /// Time of the earliest event.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.first().map(|e| e.key.time)
    }

    /// The earliest event.
    pub fn peek(&self) -> Option<&E> {
        self.heap.first().map(|e| &e.event)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Logical capacity under the `2n + 1` growth policy.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].key <= self.heap[i].key {
                break;
            }
            self.heap.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.heap[left].key < self.heap[smallest].key {
                smallest = left;
            }
            if right < len && self.heap[right].key < self.heap[smallest].key {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
    }

    #[cfg(test)]
    fn heap_ordered(&self) -> bool {
        (1..self.heap.len()).all(|i| self.heap[(i - 1) / 2].key <= self.heap[i].key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn t(ticks: u64) -> SimTime {
        SimTime::from_ticks(ticks)
    }

    #[test]
    fn test_empty_queue() {
        let mut queue: EventQueue<u32> = EventQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.peek_time(), None);
        assert_eq!(queue.pop_min(), None);
    }

    #[test]
    fn test_pops_in_time_order() {
        let mut queue = EventQueue::new();
        for (i, ticks) in [50u64, 10, 40, 30, 20].iter().enumerate() {
            queue.insert(i, t(*ticks));
        }
        assert_eq!(queue.peek_time(), Some(t(10)));

        let times: Vec<SimTime> = std::iter::from_fn(|| queue.pop_min_with_time())
            .map(|(time, _)| time)
            .collect();
        assert_eq!(times, vec![t(10), t(20), t(30), t(40), t(50)]);
    }

    #[test]
    fn test_equal_times_are_fifo() {
        let mut queue = EventQueue::new();
        for i in 0..10 {
            queue.insert(i, t(7));
        }
        queue.insert(99, t(3));

        assert_eq!(queue.pop_min(), Some(99));
        let order: Vec<i32> = std::iter::from_fn(|| queue.pop_min()).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_growth_policy() {
        let mut queue = EventQueue::new();
        assert_eq!(queue.capacity(), 511);
        for i in 0..511u64 {
            queue.insert(i, t(i));
        }
        assert_eq!(queue.capacity(), 511);
        queue.insert(511, t(511));
        assert_eq!(queue.capacity(), 1023);

        while queue.pop_min().is_some() {}
        assert_eq!(queue.capacity(), 1023);
    }

    #[test]
    fn test_heap_invariant_under_random_ops() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut queue = EventQueue::new();
        let mut last_popped = None;

        for round in 0..2000 {
            if rng.gen_bool(0.6) || queue.is_empty() {
                queue.insert(round, t(rng.gen_range(0..500)));
            } else {
                let min = queue.peek_time();
                let (time, _) = queue.pop_min_with_time().unwrap();
                assert_eq!(Some(time), min);
                last_popped = Some(time);
            }
            assert!(queue.heap_ordered());
        }
        assert!(last_popped.is_some());

        let mut prev = t(0);
        while let Some((time, _)) = queue.pop_min_with_time() {
            assert!(time >= prev);
            prev = time;
        }
    }
}
