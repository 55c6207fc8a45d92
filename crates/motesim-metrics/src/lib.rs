//! Metrics infrastructure for the motesim engine.
//!
//! Every metric the engine emits is declared here as a [`Metric`] constant so
//! names stay consistent across crates. Emission goes through the `metrics`
//! facade and is a no-op until the embedding program installs a recorder.
//!
//! # Example
//!
//! ```rust
//! use motesim_metrics::{metric_defs, NodeLabels};
//!
//! let labels = NodeLabels::new(3);
//! metrics::counter!(metric_defs::NOISE_SYNTHESIZED.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Declaring Metrics
//!
//! ```rust
//! use motesim_metrics::{Metric, MetricKind};
//!
//! const RETRIES: Metric = Metric::counter("motesim.radio.retries", "Retransmissions").per_node();
//!
//! assert_eq!(RETRIES.kind, MetricKind::Counter);
//! assert_eq!(RETRIES.labels(), &["node"]);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, Unit};
use std::fmt;

/// Label keys on node-scoped metrics.
pub const NODE_LABELS: &[&str] = &["node"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        })
    }
}

/// Name and metadata of one engine metric. Every engine metric counts
/// something, so the unit is always [`Unit::Count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    /// Whether emissions carry [`NODE_LABELS`].
    pub per_node: bool,
}

impl Metric {
    pub const fn counter(name: &'static str, description: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Counter,
            description,
            per_node: false,
        }
    }

    pub const fn gauge(name: &'static str, description: &'static str) -> Self {
        Metric {
            name,
            kind: MetricKind::Gauge,
            description,
            per_node: false,
        }
    }

    /// Mark the metric as labelled by node.
    pub const fn per_node(mut self) -> Self {
        self.per_node = true;
        self
    }

    /// Label keys emissions of this metric carry.
    pub fn labels(&self) -> &'static [&'static str] {
        if self.per_node {
            NODE_LABELS
        } else {
            &[]
        }
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, Unit::Count, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, Unit::Count, self.description),
        }
    }
}

/// Every metric the engine emits.
pub mod metric_defs {
    use super::Metric;

    // ========================================================================
    // Event Queue
    // ========================================================================

    pub const QUEUE_EVENTS_EXECUTED: Metric =
        Metric::counter("motesim.queue.events_executed", "Events whose handler ran");

    /// Popped for a powered-off mote without the force flag.
    pub const QUEUE_EVENTS_SKIPPED: Metric = Metric::counter(
        "motesim.queue.events_skipped",
        "Events skipped because the target mote was off",
    );

    pub const QUEUE_DEPTH: Metric =
        Metric::gauge("motesim.queue.depth", "Pending events in the queue");

    // ========================================================================
    // Store
    // ========================================================================

    /// Index rebuilds, summed over every table.
    pub const STORE_REHASHES: Metric = Metric::counter(
        "motesim.store.rehashes",
        "Hash table index rebuilds, including tombstone compaction",
    );

    // ========================================================================
    // Radio Models
    // ========================================================================

    pub const NOISE_FALLBACKS: Metric = Metric::counter(
        "motesim.noise.fallbacks",
        "Noise synthesis steps that fell back to the most-sampled fingerprint",
    )
    .per_node();

    /// Readings produced by synthesis rather than trace replay.
    pub const NOISE_SYNTHESIZED: Metric = Metric::counter(
        "motesim.noise.synthesized",
        "Noise readings synthesized from the trained model",
    )
    .per_node();

    pub const LINK_LINKS: Metric =
        Metric::gauge("motesim.link.links", "Explicit gain links");

    /// Every metric, for bulk registration.
    pub const ALL: &[&Metric] = &[
        &QUEUE_EVENTS_EXECUTED,
        &QUEUE_EVENTS_SKIPPED,
        &QUEUE_DEPTH,
        &STORE_REHASHES,
        &NOISE_FALLBACKS,
        &NOISE_SYNTHESIZED,
        &LINK_LINKS,
    ];
}

/// Label values for a node-scoped emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabels {
    pub node: String,
}

impl NodeLabels {
    pub fn new(id: impl fmt::Display) -> Self {
        NodeLabels {
            node: id.to_string(),
        }
    }

    /// Labels in the form the `metrics` macros take.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("node", self.node.clone())]
    }
}

/// Describe every engine metric to the installed recorder. Without a
/// recorder this does nothing.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_labels() {
        let labels = NodeLabels::new(17);
        assert_eq!(labels.to_labels(), vec![("node", "17".to_string())]);
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::QUEUE_DEPTH.name, "motesim.queue.depth");
        assert_eq!(metric_defs::QUEUE_DEPTH.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::NOISE_FALLBACKS.labels(), NODE_LABELS);
        assert!(metric_defs::QUEUE_DEPTH.labels().is_empty());
        assert_eq!(metric_defs::STORE_REHASHES.kind, MetricKind::Counter);
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("motesim.")));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
