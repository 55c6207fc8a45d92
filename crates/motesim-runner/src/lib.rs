//! # motesim-runner
//!
//! The discrete-event core of motesim: an event queue over virtual time, the
//! [`Simulation`] driver that owns the clock, node context, mote power state
//! and both radio models, plus YAML configuration loading.
//!
//! ## Example
//!
//! ```rust
//! use motesim_runner::{NodeId, SimEvent, SimTime, Simulation};
//!
//! let mut sim = Simulation::new(16, 42);
//! sim.gain_mut().add(NodeId(1), NodeId(2), -54.0).unwrap();
//!
//! sim.schedule(SimEvent::new(SimTime::from_millis(10), NodeId(1), |sim, event| {
//!     let gain = sim.gain().value(event.node, NodeId(2));
//!     assert_eq!(gain, -54.0);
//! }));
//!
//! assert_eq!(sim.run_until(SimTime::from_secs(1.0)), 1);
//! assert_eq!(sim.time_string(), "0:0:0.010000000");
//! ```

pub mod config;
pub mod event;
pub mod queue;
pub mod simulation;

pub use config::{
    build_simulation, load_config, load_config_from_str, parse_trace, ConfigError, LinkConfig,
    NodeConfig, SimConfig,
};
pub use event::{Cleanup, Handler, Payload, Retained, SimEvent};
pub use queue::EventQueue;
pub use simulation::{
    MoteState, NodeGuard, RetainedHandler, Simulation, SimulationStats, DEFAULT_RETAINED_LIMIT,
};

pub use motesim_common::{NodeId, SimTime, TICKS_PER_SECOND};
