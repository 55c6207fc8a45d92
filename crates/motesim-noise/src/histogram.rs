//! Fingerprints and per-fingerprint histograms.

use crate::{
    NOISE_DEFAULT_ELEMENT_SIZE, NOISE_HISTORY, NOISE_MAX, NOISE_MIN, NOISE_MIN_QUANTIZE,
    NOISE_NUM_VALUES, NOISE_QUANTIZE_INTERVAL,
};
use motesim_store::KeyHasher;
use xxhash_rust::xxh64::xxh64;

/// Window of quantized bins preceding a reading.
pub type Fingerprint = [u8; NOISE_HISTORY];

fn clamp(sample: i8) -> i8 {
    if !(NOISE_MIN..=NOISE_MAX).contains(&sample) {
        NOISE_MIN
    } else {
        sample
    }
}

/// Fingerprint bin for a reading. Readings outside the representable range
/// count as [`NOISE_MIN`].
pub fn quantize(sample: i8) -> u8 {
    ((clamp(sample) - NOISE_MIN) / NOISE_QUANTIZE_INTERVAL + 1) as u8
}

/// CDF bin for a reading.
pub fn cdf_bin(sample: i8) -> usize {
    (clamp(sample) as i16 - NOISE_MIN_QUANTIZE as i16) as usize
}

/// xxHash64 of the raw fingerprint bytes, folded to 32 bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintHasher;

impl KeyHasher<Fingerprint> for FingerprintHasher {
    fn hash(&self, key: &Fingerprint) -> u32 {
        let h = xxh64(key, 0);
        (h ^ (h >> 32)) as u32
    }

    fn eq(&self, a: &Fingerprint, b: &Fingerprint) -> bool {
        a == b
    }
}

/// Raw readings observed after one fingerprint, plus their CDF once realized.
#[derive(Debug, Clone)]
pub struct NoiseHistogram {
    samples: Vec<i8>,
    cdf: Vec<f64>,
    realized: bool,
}

impl Default for NoiseHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseHistogram {
    pub fn new() -> Self {
        NoiseHistogram {
            samples: Vec::with_capacity(NOISE_DEFAULT_ELEMENT_SIZE),
            cdf: Vec::new(),
            realized: false,
        }
    }

    /// Record a reading. Invalidates a realized CDF.
    pub fn record(&mut self, sample: i8) {
        self.samples.push(sample);
        self.realized = false;
    }

    pub fn samples(&self) -> &[i8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_realized(&self) -> bool {
        self.realized
    }

    /// Build the CDF from the recorded readings. Returns `false` if it was
    /// already up to date.
    pub fn realize(&mut self) -> bool {
        if self.realized {
            return false;
        }

        let mut counts = vec![0u32; NOISE_NUM_VALUES];
        for &s in &self.samples {
            counts[cdf_bin(s)] += 1;
        }

        let total = self.samples.len().max(1) as f64;
        let mut acc = 0.0;
        self.cdf = counts
            .iter()
            .map(|&c| {
                acc += c as f64 / total;
                acc
            })
            .collect();
        self.realized = true;
        true
    }

    /// The realized CDF, one entry per bin.
    pub fn cdf(&self) -> Option<&[f64]> {
        self.realized.then_some(self.cdf.as_slice())
    }

    /// Map a uniform draw in `[0, 1)` to a reading: the first bin with mass
    /// whose cumulative probability reaches the draw.
    pub fn draw(&self, uniform: f64) -> Option<i8> {
        let cdf = self.cdf()?;
        let bin = cdf
            .iter()
            .position(|&c| c > 0.0 && c >= uniform)
            .or_else(|| {
                // Rounding left the last cumulative value short of the draw.
                let mut prev = 0.0;
                let mut last = None;
                for (i, &c) in cdf.iter().enumerate() {
                    if c > prev {
                        last = Some(i);
                    }
                    prev = c;
                }
                last
            })?;
        Some((NOISE_MIN_QUANTIZE as i16 + bin as i16) as i8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(-115), 1);
        assert_eq!(quantize(-111), 1);
        assert_eq!(quantize(-110), 2);
        assert_eq!(quantize(-5), 23);
        // Out of range readings clamp to the minimum.
        assert_eq!(quantize(-120), 1);
        assert_eq!(quantize(0), 1);
        assert_eq!(quantize(127), 1);
    }

    #[test]
    fn test_cdf_bin() {
        assert_eq!(cdf_bin(-115), 0);
        assert_eq!(cdf_bin(-5), NOISE_NUM_VALUES - 1);
        assert_eq!(cdf_bin(-128), 0);
    }

    #[test]
    fn test_realize_builds_cdf() {
        let mut hist = NoiseHistogram::new();
        for s in [-100, -100, -99, -97] {
            hist.record(s);
        }
        assert!(hist.cdf().is_none());
        assert!(hist.realize());
        assert!(!hist.realize());

        let cdf = hist.cdf().unwrap();
        assert_eq!(cdf.len(), NOISE_NUM_VALUES);
        assert_relative_eq!(cdf[cdf_bin(-101)], 0.0);
        assert_relative_eq!(cdf[cdf_bin(-100)], 0.5);
        assert_relative_eq!(cdf[cdf_bin(-99)], 0.75);
        assert_relative_eq!(cdf[cdf_bin(-98)], 0.75);
        assert_relative_eq!(cdf[NOISE_NUM_VALUES - 1], 1.0);
    }

    #[test]
    fn test_draw_maps_uniform_to_bins() {
        let mut hist = NoiseHistogram::new();
        for s in [-100, -100, -99, -97] {
            hist.record(s);
        }
        hist.realize();

        assert_eq!(hist.draw(0.0), Some(-100));
        assert_eq!(hist.draw(0.5), Some(-100));
        assert_eq!(hist.draw(0.6), Some(-99));
        assert_eq!(hist.draw(0.9), Some(-97));
        assert_eq!(hist.draw(0.999_999), Some(-97));
    }

    #[test]
    fn test_draw_requires_realized() {
        let mut hist = NoiseHistogram::new();
        hist.record(-90);
        assert_eq!(hist.draw(0.3), None);
    }

    #[test]
    fn test_record_invalidates() {
        let mut hist = NoiseHistogram::new();
        hist.record(-90);
        hist.realize();
        hist.record(-91);
        assert!(!hist.is_realized());
    }

    #[test]
    fn test_fingerprint_hasher() {
        let h = FingerprintHasher;
        let a: Fingerprint = [3; NOISE_HISTORY];
        let mut b = a;
        assert_eq!(h.hash(&a), h.hash(&b));
        b[19] = 4;
        assert!(!h.eq(&a, &b));
    }
}
