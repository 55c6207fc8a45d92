//! Raw per-node noise traces.

use crate::NOISE_MIN_TRACE;

/// Growable buffer of raw noise readings.
///
/// Capacity starts at [`NOISE_MIN_TRACE`] and doubles whenever a push finds
/// the buffer full.
#[derive(Debug, Clone)]
pub struct NoiseTrace {
    samples: Vec<i8>,
    capacity: usize,
}

impl Default for NoiseTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseTrace {
    pub fn new() -> Self {
        NoiseTrace {
            samples: Vec::with_capacity(NOISE_MIN_TRACE),
            capacity: NOISE_MIN_TRACE,
        }
    }

    /// Append one reading.
    pub fn push(&mut self, sample: i8) {
        if self.samples.len() == self.capacity {
            self.grow_to(self.capacity * 2);
        }
        self.samples.push(sample);
    }

    /// Make room for at least `total` readings. Never shrinks.
    pub fn reserve(&mut self, total: usize) {
        if total > self.capacity {
            self.grow_to(total);
        }
    }

    fn grow_to(&mut self, capacity: usize) {
        self.samples
            .reserve_exact(capacity.saturating_sub(self.samples.len()));
        self.capacity = capacity;
    }

    /// Reading at index `t`.
    pub fn get(&self, t: usize) -> Option<i8> {
        self.samples.get(t).copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Logical capacity under the doubling policy.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.samples
    }
}
