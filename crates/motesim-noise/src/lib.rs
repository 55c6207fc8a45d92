//! # motesim-noise
//!
//! Trace-driven noise generation.
//!
//! Each node records a raw trace of noise readings (dBm, one signed byte per
//! sample). Training slides a 20-sample window of quantized readings over the
//! trace and, for every window ("fingerprint"), collects the raw readings that
//! followed it. Generation replays the trace exactly while the requested time
//! lies inside it, then continues as a Markov chain: the current fingerprint
//! selects a histogram, a reading is drawn from that histogram's CDF, and the
//! window slides forward.
//!
//! ```rust
//! use motesim_common::NodeId;
//! use motesim_noise::NoiseModel;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//!
//! let mut model = NoiseModel::new(8);
//! let node = NodeId(3);
//! for t in 0..40 {
//!     model.trace_add(node, -98 + (t % 3) as i8);
//! }
//! model.create_model(node).unwrap();
//!
//! let mut rng = ChaCha8Rng::seed_from_u64(1);
//! assert_eq!(model.generate(node, 25, &mut rng), -98 + (25 % 3) as i8);
//! assert_ne!(model.generate(node, 45, &mut rng), 127);
//! ```

mod histogram;
mod model;
mod trace;

pub use histogram::{cdf_bin, quantize, Fingerprint, FingerprintHasher, NoiseHistogram};
pub use model::NoiseModel;
pub use trace::NoiseTrace;

use motesim_common::NodeId;
use motesim_store::StoreError;
use thiserror::Error;

/// Lowest representable noise reading.
pub const NOISE_MIN: i8 = -115;
/// Highest representable noise reading.
pub const NOISE_MAX: i8 = -5;
/// Value of CDF bin zero.
pub const NOISE_MIN_QUANTIZE: i8 = -115;
/// Width of one fingerprint bin, in dBm.
pub const NOISE_QUANTIZE_INTERVAL: i8 = 5;
/// Fingerprint length in samples.
pub const NOISE_HISTORY: usize = 20;
/// Initial per-histogram sample capacity.
pub const NOISE_DEFAULT_ELEMENT_SIZE: usize = 8;
/// Initial per-node trace capacity.
pub const NOISE_MIN_TRACE: usize = 128;
/// Number of 1 dBm CDF bins between [`NOISE_MIN`] and [`NOISE_MAX`].
pub const NOISE_NUM_VALUES: usize = (NOISE_MAX as i16 - NOISE_MIN as i16 + 1) as usize;
/// Returned by [`NoiseModel::generate`] for nodes without a trained model.
pub const UNTRAINED_NOISE: i8 = 127;

/// Errors from training a noise model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoiseError {
    #[error("node {0} is outside the noise model's node range")]
    NodeOutOfRange(NodeId),

    #[error("noise trace for node {node} has {len} samples; training needs more than 20")]
    TraceTooShort { node: NodeId, len: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, NoiseError>;
