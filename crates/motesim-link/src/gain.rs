//! Gain links and the channel model facade.

use crate::noise_floor::NoiseFloor;
use motesim_common::{ChannelLog, NodeArena, NodeId, SimRandom, DEFAULT_MAX_NODES};
use motesim_metrics::metric_defs;
use motesim_store::{HashTable, StoreError};
use serde::{Deserialize, Serialize};

/// Gain reported for a pair with no explicit link.
pub const DEFAULT_GAIN: f64 = 1.0;

/// Default receiver sensitivity.
pub const DEFAULT_SENSITIVITY: f64 = 4.0;

const CHANNEL: &str = "Gain";

/// One explicit link out of a source node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainLink {
    pub dst: NodeId,
    pub gain: f64,
}

/// Radio channel state for every node.
#[derive(Debug, Clone)]
pub struct GainModel {
    links: NodeArena<HashTable<NodeId, f64>>,
    floors: NodeArena<NoiseFloor>,
    sensitivity: f64,
    link_count: usize,
    log: ChannelLog,
}

impl Default for GainModel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES)
    }
}

impl GainModel {
    /// Create a model for node ids below `max_nodes`.
    pub fn new(max_nodes: u32) -> Self {
        GainModel {
            links: NodeArena::new(max_nodes),
            floors: NodeArena::new(max_nodes),
            sensitivity: DEFAULT_SENSITIVITY,
            link_count: 0,
            log: ChannelLog::disabled(),
        }
    }

    /// Route diagnostics to `log`.
    pub fn with_log(mut self, log: ChannelLog) -> Self {
        self.log = log;
        self
    }

    /// Replace the diagnostic log.
    pub fn set_log(&mut self, log: ChannelLog) {
        self.log = log;
    }

    pub fn max_nodes(&self) -> u32 {
        self.links.max_nodes()
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Add a link from `src` to `dst`, overwriting the gain of an existing one.
    pub fn add(&mut self, src: NodeId, dst: NodeId, gain: f64) -> Result<(), StoreError> {
        self.log.write(
            CHANNEL,
            format!("Adding link from {src} to {dst} with gain {gain}"),
        );
        let previous = self.links.get_mut(src).insert(dst, gain)?;
        if previous.is_none() {
            self.link_count += 1;
            metrics::gauge!(metric_defs::LINK_LINKS.name).set(self.link_count as f64);
        }
        Ok(())
    }

    /// Gain from `src` to `dst`, or [`DEFAULT_GAIN`] without an explicit link.
    pub fn value(&self, src: NodeId, dst: NodeId) -> f64 {
        match self.links.get(src).search(&dst) {
            Some(&gain) => {
                self.log
                    .write(CHANNEL, format!("Getting link from {src} to {dst} with gain {gain}"));
                gain
            }
            None => {
                self.log.write(
                    CHANNEL,
                    format!("Getting default link from {src} to {dst} with gain {DEFAULT_GAIN}"),
                );
                DEFAULT_GAIN
            }
        }
    }

    /// Whether an explicit link from `src` to `dst` exists.
    pub fn connected(&self, src: NodeId, dst: NodeId) -> bool {
        let connected = self.links.get(src).contains_key(&dst);
        self.log.write(
            CHANNEL,
            format!("Testing link from {src} to {dst}: {connected}"),
        );
        connected
    }

    /// Remove the link from `src` to `dst`. No-op when absent.
    pub fn remove(&mut self, src: NodeId, dst: NodeId) {
        if self.links.get_mut(src).remove(&dst).is_some() {
            self.log
                .write(CHANNEL, format!("Removing link from {src} to {dst}"));
            self.link_count -= 1;
            metrics::gauge!(metric_defs::LINK_LINKS.name).set(self.link_count as f64);
        }
    }

    /// Explicit links out of `src`, in the order they were first added.
    pub fn links(&self, src: NodeId) -> impl DoubleEndedIterator<Item = GainLink> + '_ {
        self.links
            .get(src)
            .iter()
            .map(|(&dst, &gain)| GainLink { dst, gain })
    }

    /// Total number of explicit links.
    pub fn link_count(&self) -> usize {
        self.link_count
    }

    // ========================================================================
    // Noise Floor
    // ========================================================================

    /// Set the noise floor of `node`. Ignored for out-of-range ids.
    pub fn set_noise(&mut self, node: NodeId, mean: f64, range: f64) {
        match self.floors.get_checked_mut(node) {
            Some(floor) => {
                *floor = NoiseFloor::new(mean, range);
                self.log.write(
                    CHANNEL,
                    format!("Setting noise floor of {node} to {mean} +/- {range}"),
                );
            }
            None => tracing::debug!(%node, "Ignoring noise floor for out-of-range node"),
        }
    }

    /// The noise floor of `node`, if in range.
    pub fn noise_floor(&self, node: NodeId) -> Option<NoiseFloor> {
        self.floors.get_checked(node).copied()
    }

    pub fn noise_mean(&self, node: NodeId) -> Option<f64> {
        self.noise_floor(node).map(|f| f.mean)
    }

    pub fn noise_range(&self, node: NodeId) -> Option<f64> {
        self.noise_floor(node).map(|f| f.range)
    }

    /// Draw a noise floor sample for `node` from the engine generator.
    pub fn sample_noise(&self, node: NodeId, rng: &mut SimRandom) -> Option<f64> {
        let sample = self.noise_floor(node)?.sample(rng);
        self.log
            .write(CHANNEL, format!("Sampled noise floor of {node}: {sample}"));
        Some(sample)
    }

    // ========================================================================
    // Sensitivity
    // ========================================================================

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.sensitivity = sensitivity;
    }
}
