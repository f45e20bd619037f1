//! Running per-feature limits and min-max rescaling.
//!
//! Limits tighten monotonically as samples are assembled and are only
//! meaningful once every sample has been observed. A feature that never
//! varies has no usable range and is reported instead of divided by zero.

use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;
use crate::features::{FEATURE_COUNT, FeatureKey, FeatureVector};

/// Per-feature running minimum and maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningLimits {
    lower: FeatureVector,
    upper: FeatureVector,
    observed: u64,
}

impl Default for RunningLimits {
    fn default() -> Self {
        Self {
            lower: [f64::INFINITY; FEATURE_COUNT],
            upper: [f64::NEG_INFINITY; FEATURE_COUNT],
            observed: 0,
        }
    }
}

impl RunningLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen the limits to cover `features`.
    pub fn observe(&mut self, features: &FeatureVector) {
        for (i, &v) in features.iter().enumerate() {
            if v < self.lower[i] {
                self.lower[i] = v;
            }
            if v > self.upper[i] {
                self.upper[i] = v;
            }
        }
        self.observed += 1;
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    pub fn lower(&self) -> &FeatureVector {
        &self.lower
    }

    pub fn upper(&self) -> &FeatureVector {
        &self.upper
    }

    /// Check every feature has a usable range. Call once before exporting.
    pub fn validate(&self) -> Result<(), NormalizeError> {
        if self.observed == 0 {
            return Err(NormalizeError::NoObservations);
        }
        for key in FeatureKey::ALL {
            let i = key.index();
            if self.upper[i] == self.lower[i] {
                return Err(NormalizeError::DegenerateFeatureRange {
                    feature: key,
                    value: self.lower[i],
                });
            }
        }
        Ok(())
    }

    /// Rescale to `(value - min) / (max - min)`.
    ///
    /// Values outside the recorded range (e.g. from telemetry seen after the
    /// build) map outside [0, 1].
    pub fn normalize(&self, features: &FeatureVector) -> Result<FeatureVector, NormalizeError> {
        self.validate()?;
        let mut out = [0.0; FEATURE_COUNT];
        for (i, v) in features.iter().enumerate() {
            out[i] = (v - self.lower[i]) / (self.upper[i] - self.lower[i]);
        }
        Ok(out)
    }

    /// Named snapshot for the dataset manifest.
    pub fn to_records(&self) -> Vec<FeatureLimit> {
        FeatureKey::ALL
            .iter()
            .map(|k| FeatureLimit {
                feature: k.name(),
                min: self.lower[k.index()],
                max: self.upper[k.index()],
            })
            .collect()
    }

    /// Rebuild limits from a manifest snapshot. Records must cover every
    /// feature; unknown names are ignored.
    pub fn from_records(records: &[FeatureLimit], observed: u64) -> Option<Self> {
        let mut limits = Self::default();
        for key in FeatureKey::ALL {
            let name = key.name();
            let rec = records.iter().find(|r| r.feature == name)?;
            limits.lower[key.index()] = rec.min;
            limits.upper[key.index()] = rec.max;
        }
        limits.observed = observed;
        Some(limits)
    }
}

/// Recorded range of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureLimit {
    pub feature: String,
    pub min: f64,
    pub max: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(f: impl Fn(usize) -> f64) -> FeatureVector {
        std::array::from_fn(f)
    }

    #[test]
    fn test_unobserved_limits_rejected() {
        let limits = RunningLimits::new();
        assert_eq!(limits.validate(), Err(NormalizeError::NoObservations));
    }

    #[test]
    fn test_min_maps_to_zero_and_max_to_one() {
        let mut limits = RunningLimits::new();
        let a = vector(|i| i as f64);
        let b = vector(|i| i as f64 * 3.0 + 1.0);
        let c = vector(|i| i as f64 * 2.0 + 0.5);
        for v in [&a, &b, &c] {
            limits.observe(v);
        }
        let na = limits.normalize(&a).unwrap();
        let nb = limits.normalize(&b).unwrap();
        let nc = limits.normalize(&c).unwrap();
        for i in 0..FEATURE_COUNT {
            assert_eq!(na[i], 0.0);
            assert_eq!(nb[i], 1.0);
            assert!(nc[i] > 0.0 && nc[i] < 1.0);
        }
    }

    #[test]
    fn test_limits_only_tighten_outward() {
        let mut limits = RunningLimits::new();
        limits.observe(&vector(|_| 5.0));
        limits.observe(&vector(|_| 1.0));
        limits.observe(&vector(|_| 3.0));
        assert!(limits.lower().iter().all(|&v| v == 1.0));
        assert!(limits.upper().iter().all(|&v| v == 5.0));
        assert_eq!(limits.observed(), 3);
    }

    #[test]
    fn test_degenerate_feature_reported() {
        let mut limits = RunningLimits::new();
        limits.observe(&vector(|i| if i == 4 { 7.0 } else { 0.0 }));
        limits.observe(&vector(|i| if i == 4 { 7.0 } else { 1.0 }));
        match limits.normalize(&vector(|_| 0.5)) {
            Err(NormalizeError::DegenerateFeatureRange { feature, value }) => {
                assert_eq!(feature, FeatureKey::ALL[4]);
                assert_eq!(value, 7.0);
            }
            other => panic!("expected degenerate range, got {other:?}"),
        }
    }

    #[test]
    fn test_records_roundtrip() {
        let mut limits = RunningLimits::new();
        limits.observe(&vector(|i| i as f64));
        limits.observe(&vector(|i| i as f64 + 10.0));
        let records = limits.to_records();
        assert_eq!(records.len(), FEATURE_COUNT);
        assert_eq!(records[1].feature, "temp_avg_stdev");
        let restored = RunningLimits::from_records(&records, limits.observed()).unwrap();
        assert_eq!(restored, limits);
        assert!(RunningLimits::from_records(&records[..5], 2).is_none());
    }
}
