//! Per-node ambient noise floor.

use motesim_common::SimRandom;
use serde::{Deserialize, Serialize};

/// Ambient noise floor of one node, in dBm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseFloor {
    /// Center of the sampled range.
    pub mean: f64,
    /// Half-width of the sampled range.
    pub range: f64,
}

impl NoiseFloor {
    pub fn new(mean: f64, range: f64) -> Self {
        NoiseFloor { mean, range }
    }

    /// Draw a sample in `[mean - range, mean + range)`.
    pub fn sample(&self, rng: &mut SimRandom) -> f64 {
        self.mean + rng.symmetric_unit() * self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_bounds() {
        let floor = NoiseFloor::new(-100.0, 5.0);
        let mut rng = SimRandom::new(42);
        for _ in 0..1000 {
            let s = floor.sample(&mut rng);
            assert!((-105.0..=-95.0).contains(&s), "sample {s} out of range");
        }
    }

    #[test]
    fn test_zero_range_is_constant() {
        let floor = NoiseFloor::new(-98.0, 0.0);
        let mut rng = SimRandom::new(7);
        assert_eq!(floor.sample(&mut rng), -98.0);
    }
}
