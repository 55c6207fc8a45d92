//! # motesim-common
//!
//! Common types shared by the motesim simulation core.
//!
//! - [`SimTime`] - virtual time in simulator ticks
//! - [`NodeId`] - integer mote identifier
//! - [`NodeArena`] - id-checked per-node storage with a shared overflow bucket
//! - [`SimRandom`] - the engine's deterministic linear-congruential generator
//! - [`channel_log`] - named-channel diagnostics

pub mod channel_log;

pub use channel_log::{ChannelLog, ChannelLogConfig, LogSink, MemorySink, TracingSink};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Simulation Time
// ============================================================================

/// Number of simulator ticks in one virtual second.
pub const TICKS_PER_SECOND: u64 = 10_000_000_000;

/// Virtual simulation time, measured in ticks.
///
/// Virtual time only advances when the driver executes an event; it is
/// independent of the wall clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// The start of the simulation.
    pub const ZERO: SimTime = SimTime(0);

    /// Create a time from a raw tick count.
    pub const fn from_ticks(ticks: u64) -> Self {
        SimTime(ticks)
    }

    /// Create a time from (fractional) seconds.
    pub fn from_secs(secs: f64) -> Self {
        SimTime((secs * TICKS_PER_SECOND as f64) as u64)
    }

    /// Create a time from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms * (TICKS_PER_SECOND / 1_000))
    }

    /// Raw tick count.
    pub const fn as_ticks(&self) -> u64 {
        self.0
    }

    /// Time in seconds as a float.
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    /// Add a tick offset, saturating at the end of time.
    pub const fn saturating_add_ticks(&self, ticks: u64) -> Self {
        SimTime(self.0.saturating_add(ticks))
    }
}

impl fmt::Display for SimTime {
    /// Formats as `h:m:s.nnnnnnnnn`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let billionths = (self.0 % TICKS_PER_SECOND) / (TICKS_PER_SECOND / 1_000_000_000);
        let total_secs = self.0 / TICKS_PER_SECOND;
        let minutes = total_secs / 60;
        let hours = minutes / 60;
        write!(f, "{}:{}:{}.{:09}", hours, minutes % 60, total_secs % 60, billionths)
    }
}

// ============================================================================
// Node Identifiers
// ============================================================================

/// Identifier of a simulated mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID.
    pub const fn new(id: u32) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

/// Default maximum node id supported by a simulation.
pub const DEFAULT_MAX_NODES: u32 = 1000;

/// Per-node storage indexed by validated node id.
///
/// The arena holds `max_nodes + 1` slots. Ids `0..max_nodes` map to their own
/// slot; every id at or above `max_nodes` is clamped onto the final, shared
/// overflow slot.
#[derive(Debug, Clone)]
pub struct NodeArena<T> {
    slots: Vec<T>,
    max_nodes: u32,
}

impl<T: Default> NodeArena<T> {
    /// Create an arena for node ids up to `max_nodes`, all slots defaulted.
    pub fn new(max_nodes: u32) -> Self {
        let mut slots = Vec::with_capacity(max_nodes as usize + 1);
        slots.resize_with(max_nodes as usize + 1, T::default);
        NodeArena { slots, max_nodes }
    }
}

impl<T> NodeArena<T> {
    /// The maximum node id this arena was sized for.
    pub fn max_nodes(&self) -> u32 {
        self.max_nodes
    }

    /// Whether `id` has a dedicated slot (i.e. is not clamped to overflow).
    pub fn in_range(&self, id: NodeId) -> bool {
        id.0 < self.max_nodes
    }

    /// Slot index for `id`, clamping out-of-range ids to the overflow bucket.
    pub fn slot_index(&self, id: NodeId) -> usize {
        id.0.min(self.max_nodes) as usize
    }

    /// Access the slot for `id`, clamping to the overflow bucket.
    pub fn get(&self, id: NodeId) -> &T {
        &self.slots[self.slot_index(id)]
    }

    /// Mutably access the slot for `id`, clamping to the overflow bucket.
    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        let index = self.slot_index(id);
        &mut self.slots[index]
    }

    /// Access the slot for `id` only if it is in range.
    pub fn get_checked(&self, id: NodeId) -> Option<&T> {
        self.in_range(id).then(|| &self.slots[id.0 as usize])
    }

    /// Mutably access the slot for `id` only if it is in range.
    pub fn get_checked_mut(&mut self, id: NodeId) -> Option<&mut T> {
        if self.in_range(id) {
            Some(&mut self.slots[id.0 as usize])
        } else {
            None
        }
    }

    /// Iterate all slots, including the overflow bucket (last).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    /// Mutably iterate all slots, including the overflow bucket (last).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

// ============================================================================
// Deterministic Random Source
// ============================================================================

/// The engine's multiplicative linear-congruential generator.
///
/// Park-Miller style generator over 31 bits (multiplier 16807, computed as
/// `33614 * seed` split into halves). Runs are reproducible for a fixed seed.
#[derive(Debug, Clone)]
pub struct SimRandom {
    seed: u32,
}

impl SimRandom {
    /// Create a generator. A seed of zero would wedge on zero, so it is promoted to one.
    pub fn new(seed: u64) -> Self {
        let mut rng = SimRandom { seed: 1 };
        rng.reseed(seed);
        rng
    }

    /// Reset the generator state.
    pub fn reseed(&mut self, seed: u64) {
        let seed = (seed & 0x7FFF_FFFF) as u32;
        self.seed = if seed == 0 { 1 } else { seed };
    }

    /// Current generator state; right after a reseed, the effective seed.
    pub fn state(&self) -> u32 {
        self.seed
    }

    /// Next value in `1..=0x7FFF_FFFF`.
    pub fn next_u31(&mut self) -> u32 {
        let product = 33614u64 * self.seed as u64;
        let q = (product as u32) >> 1;
        let p = (product >> 32) as u32;
        let mut mlcg = p.wrapping_add(q);
        if mlcg & 0x8000_0000 != 0 {
            mlcg &= 0x7FFF_FFFF;
            mlcg += 1;
        }
        self.seed = mlcg;
        mlcg
    }

    /// Uniform draw from `[-1.0, 1.0)` at micro resolution.
    pub fn symmetric_unit(&mut self) -> f64 {
        let adjust = (self.next_u31() % 2_000_000) as f64;
        adjust / 1_000_000.0 - 1.0
    }
}

impl Default for SimRandom {
    fn default() -> Self {
        SimRandom::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_time_display() {
        let t = SimTime::from_ticks(3_725 * TICKS_PER_SECOND + 5 * 10);
        assert_eq!(t.to_string(), "1:2:5.000000005");
        assert_eq!(SimTime::ZERO.to_string(), "0:0:0.000000000");
    }

    #[test]
    fn test_sim_time_conversions() {
        assert_eq!(SimTime::from_secs(1.5).as_ticks(), 15_000_000_000);
        assert_eq!(SimTime::from_millis(2).as_ticks(), 20_000_000);
        assert_eq!(SimTime::from_ticks(TICKS_PER_SECOND / 4).as_secs_f64(), 0.25);
    }

    #[test]
    fn test_arena_clamps_to_overflow() {
        let mut arena: NodeArena<u32> = NodeArena::new(10);
        *arena.get_mut(NodeId(3)) = 7;
        *arena.get_mut(NodeId(500)) = 9;

        assert_eq!(*arena.get(NodeId(3)), 7);
        assert_eq!(*arena.get(NodeId(10)), 9);
        assert_eq!(*arena.get(NodeId(11)), 9);
        assert_eq!(arena.iter().count(), 11);
    }

    #[test]
    fn test_arena_checked_access() {
        let arena: NodeArena<u8> = NodeArena::new(4);
        assert!(arena.get_checked(NodeId(3)).is_some());
        assert!(arena.get_checked(NodeId(4)).is_none());
        assert!(!arena.in_range(NodeId(4)));
    }

    #[test]
    fn test_random_is_reproducible() {
        let mut a = SimRandom::new(42);
        let mut b = SimRandom::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u31(), b.next_u31());
        }
    }

    #[test]
    fn test_random_zero_seed_promoted() {
        let mut zero = SimRandom::new(0);
        let mut one = SimRandom::new(1);
        assert_eq!(zero.next_u31(), one.next_u31());
        // 33614 * 1 = 33614 -> q = 16807, p = 0
        assert_eq!(SimRandom::new(1).next_u31(), 16807);
    }

    #[test]
    fn test_symmetric_unit_bounds() {
        let mut rng = SimRandom::new(7);
        for _ in 0..1000 {
            let v = rng.symmetric_unit();
            assert!((-1.0..1.0).contains(&v));
        }
    }
}
