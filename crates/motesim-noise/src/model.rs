//! Per-node training and generation.

use crate::histogram::{quantize, Fingerprint, FingerprintHasher, NoiseHistogram};
use crate::trace::NoiseTrace;
use crate::{NoiseError, Result, NOISE_HISTORY, UNTRAINED_NOISE};
use motesim_common::{ChannelLog, NodeArena, NodeId, DEFAULT_MAX_NODES};
use motesim_metrics::{metric_defs, NodeLabels};
use motesim_store::HashTable;
use rand::Rng;

const CHANNEL: &str = "Noise";

/// Fingerprint of the `NOISE_HISTORY` readings ending at `end` (inclusive).
fn window_ending_at(trace: &[i8], end: usize) -> Fingerprint {
    let mut window = [0u8; NOISE_HISTORY];
    let start = end + 1 - NOISE_HISTORY;
    for (slot, &s) in window.iter_mut().zip(&trace[start..=end]) {
        *slot = quantize(s);
    }
    window
}

fn slide(window: &mut Fingerprint, sample: i8) {
    window.copy_within(1.., 0);
    window[NOISE_HISTORY - 1] = quantize(sample);
}

// ============================================================================
// Trained State
// ============================================================================

/// Histograms and generator state of one trained node.
#[derive(Debug, Clone)]
struct Trained {
    histograms: HashTable<Fingerprint, NoiseHistogram, FingerprintHasher>,
    /// Most-sampled fingerprint, substituted when the window is unknown.
    fallback: Fingerprint,
    fallback_len: usize,
    window: Fingerprint,
    gen_time: u32,
    last_value: i8,
}

impl Trained {
    fn train(trace: &[i8]) -> Result<Self> {
        let mut histograms: HashTable<Fingerprint, NoiseHistogram, FingerprintHasher> =
            HashTable::with_hasher(FingerprintHasher);
        let initial = window_ending_at(trace, NOISE_HISTORY - 1);

        let mut window = initial;
        for &sample in &trace[NOISE_HISTORY..] {
            match histograms.search_mut(&window) {
                Some(hist) => hist.record(sample),
                None => {
                    let mut hist = NoiseHistogram::new();
                    hist.record(sample);
                    histograms.insert(window, hist)?;
                }
            }
            slide(&mut window, sample);
        }

        let mut trained = Trained {
            histograms,
            fallback: initial,
            fallback_len: 0,
            window: initial,
            gen_time: (NOISE_HISTORY - 1) as u32,
            last_value: trace[NOISE_HISTORY - 1],
        };

        // Realize in trace order so the fallback is the first fingerprint to
        // reach the largest sample count.
        let mut window = initial;
        for &sample in &trace[NOISE_HISTORY..] {
            trained.realize(&window);
            slide(&mut window, sample);
        }
        Ok(trained)
    }

    fn realize(&mut self, key: &Fingerprint) {
        if let Some(hist) = self.histograms.search_mut(key) {
            if hist.realize() && hist.len() > self.fallback_len {
                self.fallback_len = hist.len();
                self.fallback = *key;
            }
        }
    }

    /// Reset the generator to the trace position `t`, which must lie inside
    /// the trace. Times before the first full window anchor on that window.
    fn seek(&mut self, trace: &[i8], t: usize) {
        let anchor = t.max(NOISE_HISTORY - 1);
        self.window = window_ending_at(trace, anchor);
        self.gen_time = anchor as u32;
        self.last_value = trace[anchor];
    }

    /// One synthesis step: draw a reading for the current window and slide.
    fn step<R: Rng + ?Sized>(&mut self, rng: &mut R, labels: &NodeLabels) -> Option<i8> {
        if !self.histograms.contains_key(&self.window) {
            self.window = self.fallback;
            metrics::counter!(metric_defs::NOISE_FALLBACKS.name, &labels.to_labels())
                .increment(1);
        }
        let key = self.window;
        self.realize(&key);

        let hist = self.histograms.search(&key)?;
        let sample = if hist.len() == 1 {
            hist.samples()[0]
        } else {
            hist.draw(rng.gen::<f64>())?
        };

        slide(&mut self.window, sample);
        Some(sample)
    }
}

// ============================================================================
// Noise Model
// ============================================================================

#[derive(Debug, Clone, Default)]
struct NodeNoise {
    trace: NoiseTrace,
    trained: Option<Trained>,
}

/// Trace-driven noise model for every node.
#[derive(Debug, Clone)]
pub struct NoiseModel {
    nodes: NodeArena<NodeNoise>,
    log: ChannelLog,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES)
    }
}

impl NoiseModel {
    /// Create a model for node ids below `max_nodes`.
    pub fn new(max_nodes: u32) -> Self {
        NoiseModel {
            nodes: NodeArena::new(max_nodes),
            log: ChannelLog::disabled(),
        }
    }

    /// Route diagnostics to `log`.
    pub fn with_log(mut self, log: ChannelLog) -> Self {
        self.log = log;
        self
    }

    pub fn set_log(&mut self, log: ChannelLog) {
        self.log = log;
    }

    // ------------------------------------------------------------------------
    // Traces
    // ------------------------------------------------------------------------

    /// Append a raw reading to `node`'s trace. Ignored for out-of-range ids.
    pub fn trace_add(&mut self, node: NodeId, sample: i8) {
        match self.nodes.get_checked_mut(node) {
            Some(n) => n.trace.push(sample),
            None => tracing::debug!(%node, "Ignoring noise sample for out-of-range node"),
        }
    }

    /// Pre-size `node`'s trace for `total` readings.
    pub fn reserve(&mut self, node: NodeId, total: usize) {
        if let Some(n) = self.nodes.get_checked_mut(node) {
            n.trace.reserve(total);
        }
    }

    /// The raw recorded reading at `t`, if the trace reaches that far.
    pub fn real_noise(&self, node: NodeId, t: u32) -> Option<i8> {
        let reading = self.nodes.get_checked(node)?.trace.get(t as usize);
        if reading.is_none() {
            self.log.error(
                CHANNEL,
                format!(
                    "Asked for noise element {t} of node {node} when there are only {}",
                    self.trace_len(node)
                ),
            );
        }
        reading
    }

    /// Number of recorded readings for `node`.
    pub fn trace_len(&self, node: NodeId) -> usize {
        self.nodes.get_checked(node).map_or(0, |n| n.trace.len())
    }

    /// The recorded trace of `node`.
    pub fn trace(&self, node: NodeId) -> Option<&NoiseTrace> {
        self.nodes.get_checked(node).map(|n| &n.trace)
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    /// Train `node`'s model from its recorded trace, replacing any previous
    /// model.
    pub fn create_model(&mut self, node: NodeId) -> Result<()> {
        let state = self
            .nodes
            .get_checked_mut(node)
            .ok_or(NoiseError::NodeOutOfRange(node))?;

        let trace = state.trace.as_slice();
        if trace.len() <= NOISE_HISTORY {
            return Err(NoiseError::TraceTooShort {
                node,
                len: trace.len(),
            });
        }

        let trained = Trained::train(trace)?;
        self.log.write(
            CHANNEL,
            format!(
                "Trained node {node}: {} readings, {} fingerprints, fallback seen {} times",
                trace.len(),
                trained.histograms.len(),
                trained.fallback_len
            ),
        );
        state.trained = Some(trained);
        Ok(())
    }

    pub fn is_trained(&self, node: NodeId) -> bool {
        self.nodes
            .get_checked(node)
            .is_some_and(|n| n.trained.is_some())
    }

    /// Number of distinct fingerprints in `node`'s trained model.
    pub fn fingerprint_count(&self, node: NodeId) -> usize {
        self.nodes
            .get_checked(node)
            .and_then(|n| n.trained.as_ref())
            .map_or(0, |t| t.histograms.len())
    }

    /// The histogram recorded after `key` for `node`.
    pub fn histogram(&self, node: NodeId, key: &Fingerprint) -> Option<&NoiseHistogram> {
        self.nodes
            .get_checked(node)?
            .trained
            .as_ref()?
            .histograms
            .search(key)
    }

    /// The current generator window of `node`.
    pub fn window(&self, node: NodeId) -> Option<Fingerprint> {
        Some(self.nodes.get_checked(node)?.trained.as_ref()?.window)
    }

    // ------------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------------

    /// Noise reading for `node` at sample time `t`.
    ///
    /// Inside the recorded trace this is exact replay. Past it, the model
    /// synthesizes one reading per elapsed sample since the last query.
    /// Untrained and out-of-range nodes yield [`UNTRAINED_NOISE`].
    pub fn generate<R: Rng + ?Sized>(&mut self, node: NodeId, t: u32, rng: &mut R) -> i8 {
        let Some(state) = self.nodes.get_checked_mut(node) else {
            self.log.error(
                CHANNEL,
                format!("Tried to generate noise for out-of-range node {node}"),
            );
            return UNTRAINED_NOISE;
        };
        let Some(trained) = state.trained.as_mut() else {
            self.log.error(
                CHANNEL,
                format!("Tried to generate noise from an uninitialized radio model of node {node}"),
            );
            return UNTRAINED_NOISE;
        };

        let trace = state.trace.as_slice();
        if let Some(&recorded) = trace.get(t as usize) {
            trained.seek(trace, t as usize);
            return recorded;
        }

        if t == trained.gen_time {
            return trained.last_value;
        }
        if t < trained.gen_time {
            self.log.write(
                CHANNEL,
                format!(
                    "Noise for node {node} requested at {t}, before last generated time {}",
                    trained.gen_time
                ),
            );
            return trained.last_value;
        }

        let labels = NodeLabels::new(node);
        let steps = t - trained.gen_time;
        for _ in 0..steps {
            match trained.step(rng, &labels) {
                Some(sample) => trained.last_value = sample,
                None => {
                    self.log.error(
                        CHANNEL,
                        format!("No noise histogram available for node {node}"),
                    );
                    return UNTRAINED_NOISE;
                }
            }
        }
        trained.gen_time = t;
        metrics::counter!(metric_defs::NOISE_SYNTHESIZED.name, &labels.to_labels())
            .increment(steps as u64);

        trained.last_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::cdf_bin;
    use crate::NOISE_MIN;
    use motesim_common::{ChannelLogConfig, MemorySink};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use statrs::distribution::{ChiSquared, ContinuousCDF};
    use std::sync::Arc;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(0x5eed)
    }

    fn train(model: &mut NoiseModel, node: NodeId, trace: &[i8]) {
        for &s in trace {
            model.trace_add(node, s);
        }
        model.create_model(node).unwrap();
    }

    fn sawtooth(len: usize) -> Vec<i8> {
        (0..len).map(|i| -110 + (i % 17) as i8 * 3).collect()
    }

    #[test]
    fn test_exact_replay_inside_trace() {
        let trace = sawtooth(200);
        let mut model = NoiseModel::new(4);
        train(&mut model, NodeId(1), &trace);

        let mut rng = rng();
        for t in [0u32, 5, 19, 20, 150, 199, 3, 100] {
            assert_eq!(model.generate(NodeId(1), t, &mut rng), trace[t as usize]);
        }
    }

    #[test]
    fn test_end_to_end_forty_samples() {
        let trace: Vec<i8> = (0..40).map(|i| -100 + (i % 4) as i8).collect();
        let mut model = NoiseModel::new(8);
        train(&mut model, NodeId(3), &trace);

        let mut rng = rng();
        assert_eq!(model.generate(NodeId(3), 25, &mut rng), trace[25]);

        let synthesized = model.generate(NodeId(3), 45, &mut rng);
        assert_ne!(synthesized, UNTRAINED_NOISE);
        assert!((-100..=-97).contains(&synthesized));
    }

    #[test]
    fn test_untrained_returns_sentinel_and_logs() {
        let sink = Arc::new(MemorySink::new());
        let log = ChannelLog::with_sink(ChannelLogConfig::none(), sink.clone());
        let mut model = NoiseModel::new(4).with_log(log);

        assert_eq!(model.generate(NodeId(2), 30, &mut rng()), UNTRAINED_NOISE);
        assert_eq!(model.generate(NodeId(9), 30, &mut rng()), UNTRAINED_NOISE);
        assert_eq!(sink.channel_lines("Noise").len(), 2);
    }

    #[test]
    fn test_short_trace_rejected() {
        let mut model = NoiseModel::new(4);
        for s in sawtooth(NOISE_HISTORY) {
            model.trace_add(NodeId(0), s);
        }
        assert_eq!(
            model.create_model(NodeId(0)),
            Err(NoiseError::TraceTooShort {
                node: NodeId(0),
                len: NOISE_HISTORY
            })
        );
        assert!(!model.is_trained(NodeId(0)));
    }

    #[test]
    fn test_out_of_range_training_rejected() {
        let mut model = NoiseModel::new(4);
        assert_eq!(
            model.create_model(NodeId(4)),
            Err(NoiseError::NodeOutOfRange(NodeId(4)))
        );
        model.trace_add(NodeId(4), -90);
        assert_eq!(model.trace_len(NodeId(4)), 0);
    }

    #[test]
    fn test_repeat_query_is_cached() {
        let trace = sawtooth(60);
        let mut model = NoiseModel::new(4);
        train(&mut model, NodeId(0), &trace);

        let mut rng = rng();
        let first = model.generate(NodeId(0), 100, &mut rng);
        let again = model.generate(NodeId(0), 100, &mut rng);
        assert_eq!(first, again);

        // Earlier times past the trace cannot rewind the chain.
        assert_eq!(model.generate(NodeId(0), 80, &mut rng), first);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let trace = sawtooth(120);
        let run = || {
            let mut model = NoiseModel::new(2);
            train(&mut model, NodeId(1), &trace);
            let mut rng = rng();
            (120..220)
                .map(|t| model.generate(NodeId(1), t, &mut rng))
                .collect::<Vec<i8>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_deterministic_trace_continues_pattern() {
        // Every fingerprint in a periodic trace has exactly one successor, so
        // synthesis continues the period.
        let trace = sawtooth(200);
        let mut model = NoiseModel::new(2);
        train(&mut model, NodeId(0), &trace);

        let mut rng = rng();
        for t in 200..260u32 {
            let expected = -110 + (t as usize % 17) as i8 * 3;
            assert_eq!(model.generate(NodeId(0), t, &mut rng), expected);
        }
    }

    #[test]
    fn test_histograms_keyed_by_preceding_window() {
        let trace = sawtooth(60);
        let mut model = NoiseModel::new(2);
        train(&mut model, NodeId(0), &trace);

        let key = window_ending_at(&trace, NOISE_HISTORY - 1);
        let hist = model.histogram(NodeId(0), &key).unwrap();
        assert!(hist.is_realized());
        assert!(hist.samples().iter().all(|&s| s == trace[NOISE_HISTORY]));
        assert_eq!(model.fingerprint_count(NodeId(0)), 17);
    }

    #[test]
    fn test_unknown_window_falls_back() {
        let trace = sawtooth(80);
        let mut model = NoiseModel::new(2);
        train(&mut model, NodeId(0), &trace);

        if let Some(state) = model.nodes.get_checked_mut(NodeId(0)) {
            if let Some(trained) = state.trained.as_mut() {
                trained.window = [23; NOISE_HISTORY];
                trained.gen_time = 79;
            }
        }
        let sample = model.generate(NodeId(0), 81, &mut rng());
        assert_ne!(sample, UNTRAINED_NOISE);
        assert!(sample >= NOISE_MIN);
    }

    #[test]
    fn test_synthesis_converges_to_trained_cdf() {
        // All readings share one fingerprint bin, so the window never changes
        // and every synthesized reading is drawn from the same histogram.
        let pattern: [i8; 10] = [-100, -100, -100, -99, -99, -98, -98, -98, -98, -96];
        let trace: Vec<i8> = pattern.iter().copied().cycle().take(1000).collect();

        let mut model = NoiseModel::new(2);
        train(&mut model, NodeId(1), &trace);
        assert_eq!(model.fingerprint_count(NodeId(1)), 1);

        let key = [quantize(-100); NOISE_HISTORY];
        let cdf = model
            .histogram(NodeId(1), &key)
            .and_then(|h| h.cdf())
            .map(|c| c.to_vec())
            .unwrap();

        let draws = 20_000u32;
        let mut counts = vec![0u32; cdf.len()];
        let mut rng = rng();
        for t in 1000..1000 + draws {
            let s = model.generate(NodeId(1), t, &mut rng);
            counts[cdf_bin(s)] += 1;
        }

        let mut categories = 0;
        let mut chi2 = 0.0;
        let mut prev = 0.0;
        for (i, &c) in cdf.iter().enumerate() {
            let p = c - prev;
            prev = c;
            if p > 0.0 {
                categories += 1;
                let expected = p * draws as f64;
                let observed = counts[i] as f64;
                chi2 += (observed - expected).powi(2) / expected;
            } else {
                assert_eq!(counts[i], 0, "drew from an empty bin {i}");
            }
        }
        let critical = ChiSquared::new((categories - 1) as f64)
            .unwrap()
            .inverse_cdf(0.999);
        assert!(chi2 < critical, "chi2 {chi2} >= {critical}");
    }
}
