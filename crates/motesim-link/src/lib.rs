//! # motesim-link
//!
//! Radio channel model: a per-node sparse directed graph of link gains plus an
//! ambient noise floor for each node.
//!
//! ## Features
//!
//! - **Gain links**: explicit `src -> dst` gains; pairs without a link read the
//!   default gain of 1.0 but are not [`connected`](GainModel::connected)
//! - **Noise floor**: per-node `(mean, range)`, sampled uniformly from
//!   `[mean - range, mean + range]` with the engine's deterministic generator
//! - **Sensitivity**: a global receiver sensitivity, stored for the radio stack
//!
//! Node ids at or above the configured maximum share one overflow bucket for
//! links. Noise floor calls for such ids are ignored or answer `None`.

mod gain;
mod noise_floor;

pub use gain::{GainLink, GainModel, DEFAULT_GAIN, DEFAULT_SENSITIVITY};
pub use noise_floor::NoiseFloor;
