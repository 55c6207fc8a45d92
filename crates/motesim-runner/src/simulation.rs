//! The simulation driver: virtual clock, node context, mote power and the
//! event loop.

use crate::event::{Cleanup, Retained, SimEvent};
use crate::queue::EventQueue;
use motesim_common::{
    ChannelLog, NodeArena, NodeId, SimRandom, SimTime, DEFAULT_MAX_NODES, TICKS_PER_SECOND,
};
use motesim_link::GainModel;
use motesim_metrics::metric_defs;
use motesim_noise::NoiseModel;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

const CHANNEL: &str = "Core";

/// Retained cleanup parts kept for [`Simulation::drain_retained`] before the
/// oldest are released.
pub const DEFAULT_RETAINED_LIMIT: usize = 1024;

/// Receiver for parts that cleanup policies hand back.
pub type RetainedHandler = Box<dyn FnMut(Retained)>;

/// Power state of one mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoteState {
    pub on: bool,
}

impl Default for MoteState {
    fn default() -> Self {
        MoteState { on: true }
    }
}

/// Counters accumulated by the event loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    /// Events popped from the queue.
    pub total_events: u64,
    /// Events whose handler ran.
    pub events_executed: u64,
    /// Events dropped because their mote was off.
    pub events_skipped: u64,
    /// Retained parts released because nobody collected them in time.
    pub retained_released: u64,
}

// ============================================================================
// Simulation
// ============================================================================

/// A single-threaded discrete-event simulation.
pub struct Simulation {
    queue: EventQueue<SimEvent>,
    time: SimTime,
    current_node: NodeId,
    motes: NodeArena<MoteState>,
    gain: GainModel,
    noise: NoiseModel,
    random: SimRandom,
    noise_rng: ChaCha8Rng,
    seed: u64,
    log: ChannelLog,
    retained: VecDeque<Retained>,
    retained_limit: usize,
    on_retained: Option<RetainedHandler>,
    stats: SimulationStats,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODES, 1)
    }
}

impl Simulation {
    /// Create a simulation for node ids below `max_nodes`.
    ///
    /// # Arguments
    ///
    /// * `max_nodes` - Size of the per-node tables; larger ids share an overflow slot
    /// * `seed` - Seed for the engine generator and noise synthesis (0 acts as 1)
    pub fn new(max_nodes: u32, seed: u64) -> Self {
        let random = SimRandom::new(seed);
        let seed = random.state() as u64;
        Simulation {
            queue: EventQueue::new(),
            time: SimTime::ZERO,
            current_node: NodeId(0),
            motes: NodeArena::new(max_nodes),
            gain: GainModel::new(max_nodes),
            noise: NoiseModel::new(max_nodes),
            random,
            noise_rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            log: ChannelLog::disabled(),
            retained: VecDeque::new(),
            retained_limit: DEFAULT_RETAINED_LIMIT,
            on_retained: None,
            stats: SimulationStats::default(),
        }
    }

    /// Send diagnostics from the driver and both radio models to `log`.
    pub fn with_log(mut self, log: ChannelLog) -> Self {
        self.gain.set_log(log.clone());
        self.noise.set_log(log.clone());
        self.log = log;
        self
    }

    pub fn log(&self) -> &ChannelLog {
        &self.log
    }

    pub fn max_nodes(&self) -> u32 {
        self.motes.max_nodes()
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    pub fn time(&self) -> SimTime {
        self.time
    }

    pub fn set_time(&mut self, time: SimTime) {
        self.time = time;
    }

    pub fn time_in_seconds(&self) -> f64 {
        self.time.as_secs_f64()
    }

    pub fn ticks_per_second(&self) -> u64 {
        TICKS_PER_SECOND
    }

    /// Current time as `h:m:s.nnnnnnnnn`.
    pub fn time_string(&self) -> String {
        self.time.to_string()
    }

    // ------------------------------------------------------------------------
    // Randomness
    // ------------------------------------------------------------------------

    /// Reseed the engine generator and the noise synthesis generator.
    pub fn random_seed(&mut self, seed: u64) {
        self.random.reseed(seed);
        self.seed = self.random.state() as u64;
        self.noise_rng = ChaCha8Rng::seed_from_u64(self.seed);
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next value of the engine generator.
    pub fn random(&mut self) -> u32 {
        self.random.next_u31()
    }

    // ------------------------------------------------------------------------
    // Node Context
    // ------------------------------------------------------------------------

    /// The node whose event is running.
    pub fn current_node(&self) -> NodeId {
        self.current_node
    }

    /// Switch the node context until the returned guard drops.
    ///
    /// ```rust
    /// use motesim_common::NodeId;
    /// use motesim_runner::Simulation;
    ///
    /// let mut sim = Simulation::default();
    /// {
    ///     let guard = sim.enter_node(NodeId(7));
    ///     assert_eq!(guard.current_node(), NodeId(7));
    /// }
    /// assert_eq!(sim.current_node(), NodeId(0));
    /// ```
    pub fn enter_node(&mut self, node: NodeId) -> NodeGuard<'_> {
        let previous = std::mem::replace(&mut self.current_node, node);
        NodeGuard {
            sim: self,
            previous,
        }
    }

    // ------------------------------------------------------------------------
    // Mote Power
    // ------------------------------------------------------------------------

    pub fn turn_on(&mut self, node: NodeId) {
        self.motes.get_mut(node).on = true;
        self.log.write(CHANNEL, format!("Turning on mote {node}"));
    }

    pub fn turn_off(&mut self, node: NodeId) {
        self.motes.get_mut(node).on = false;
        self.log.write(CHANNEL, format!("Turning off mote {node}"));
    }

    pub fn is_on(&self, node: NodeId) -> bool {
        self.motes.get(node).on
    }

    // ------------------------------------------------------------------------
    // Radio Models
    // ------------------------------------------------------------------------

    pub fn gain(&self) -> &GainModel {
        &self.gain
    }

    pub fn gain_mut(&mut self) -> &mut GainModel {
        &mut self.gain
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    pub fn noise_mut(&mut self) -> &mut NoiseModel {
        &mut self.noise
    }

    /// Noise floor sample for `node`, drawn from the engine generator.
    pub fn sample_noise_floor(&mut self, node: NodeId) -> Option<f64> {
        self.gain.sample_noise(node, &mut self.random)
    }

    /// Trace-driven noise reading for `node` at sample time `t`.
    pub fn generate_noise(&mut self, node: NodeId, t: u32) -> i8 {
        self.noise.generate(node, t, &mut self.noise_rng)
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Queue `event` at its own time.
    pub fn schedule(&mut self, event: SimEvent) {
        let time = event.time;
        self.queue.insert(event, time);
        metrics::gauge!(metric_defs::QUEUE_DEPTH.name).set(self.queue.len() as f64);
    }

    /// Queue a forced handler for the current node at `time`. The event
    /// struct is released after it runs.
    pub fn register_event(
        &mut self,
        time: SimTime,
        handler: impl FnOnce(&mut Simulation, &mut SimEvent) + 'static,
    ) {
        let event = SimEvent::new(time, self.current_node, handler)
            .forced()
            .with_cleanup(Cleanup::Event);
        self.schedule(event);
    }

    pub fn queue(&self) -> &EventQueue<SimEvent> {
        &self.queue
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.peek_time()
    }

    /// Take the retained parts still buffered, oldest first.
    pub fn drain_retained(&mut self) -> Vec<Retained> {
        self.retained.drain(..).collect()
    }

    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub fn retained_limit(&self) -> usize {
        self.retained_limit
    }

    /// Buffer at most `limit` retained parts. When full, the oldest part is
    /// released to make room; a limit of 0 releases everything.
    pub fn set_retained_limit(&mut self, limit: usize) {
        self.retained_limit = limit;
        while self.retained.len() > limit {
            self.retained.pop_front();
            self.stats.retained_released += 1;
        }
    }

    /// Hand every retained part to `handler` as its event finishes, instead
    /// of buffering it.
    pub fn on_retained(&mut self, handler: impl FnMut(Retained) + 'static) {
        self.on_retained = Some(Box::new(handler));
    }

    fn hand_back(&mut self, retained: Retained) {
        if let Some(handler) = self.on_retained.as_mut() {
            handler(retained);
            return;
        }
        if self.retained.len() >= self.retained_limit {
            self.stats.retained_released += 1;
            if self.retained.pop_front().is_none() {
                return;
            }
        }
        self.retained.push_back(retained);
    }

    // ------------------------------------------------------------------------
    // Event Loop
    // ------------------------------------------------------------------------

    /// Run the earliest pending event. Returns `false` if the queue was empty.
    ///
    /// The clock and node context move to the event's time and node. The
    /// handler runs unless the mote is off and the event is not forced.
    /// Cleanup always runs.
    pub fn run_next_event(&mut self) -> bool {
        let Some(mut event) = self.queue.pop_min() else {
            return false;
        };

        self.log.reset_flag();
        self.time = event.time;
        self.current_node = event.node;
        self.stats.total_events += 1;

        if event.forced || self.is_on(event.node) {
            if let Some(handler) = event.take_handler() {
                self.log.write(
                    CHANNEL,
                    format!("Running event for mote {} at {}", event.node, self.time),
                );
                handler(self, &mut event);
                self.stats.events_executed += 1;
                metrics::counter!(metric_defs::QUEUE_EVENTS_EXECUTED.name).increment(1);
            }
        } else {
            self.log.write(
                CHANNEL,
                format!("Skipping event for powered-off mote {} at {}", event.node, self.time),
            );
            self.stats.events_skipped += 1;
            metrics::counter!(metric_defs::QUEUE_EVENTS_SKIPPED.name).increment(1);
        }

        if let Some(retained) = event.clean_up() {
            self.hand_back(retained);
        }
        metrics::gauge!(metric_defs::QUEUE_DEPTH.name).set(self.queue.len() as f64);
        true
    }

    /// Run events while `continue_events(time_in_seconds)` holds and the queue
    /// is not empty. `callback` sees the zero-based count after each event.
    /// Returns the number of events run.
    pub fn run_all_events(
        &mut self,
        mut continue_events: impl FnMut(f64) -> bool,
        mut callback: impl FnMut(u64),
    ) -> u64 {
        let mut count = 0;
        while continue_events(self.time_in_seconds()) {
            if !self.run_next_event() {
                break;
            }
            callback(count);
            count += 1;
        }
        count
    }

    /// Run every event due at or before `end`. Returns the number of events run.
    pub fn run_until(&mut self, end: SimTime) -> u64 {
        let mut count = 0;
        while self.queue.peek_time().is_some_and(|t| t <= end) {
            self.run_next_event();
            count += 1;
        }
        count
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("time", &self.time)
            .field("current_node", &self.current_node)
            .field("pending_events", &self.queue.len())
            .field("seed", &self.seed)
            .field("retained", &self.retained.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Node Guard
// ============================================================================

/// Scoped node context. Restores the previous node when dropped.
pub struct NodeGuard<'a> {
    sim: &'a mut Simulation,
    previous: NodeId,
}

impl NodeGuard<'_> {
    /// The node that becomes current again on drop.
    pub fn previous(&self) -> NodeId {
        self.previous
    }
}

impl Deref for NodeGuard<'_> {
    type Target = Simulation;

    fn deref(&self) -> &Simulation {
        self.sim
    }
}

impl DerefMut for NodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Simulation {
        self.sim
    }
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        self.sim.current_node = self.previous;
    }
}
