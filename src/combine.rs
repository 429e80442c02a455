//! Signal combiner: concatenates the 12 lead signals into the feature vector the frozen
//! artifacts were fit on.

use crate::config::{LEAD_COUNT, SAMPLES_PER_LEAD};
use crate::error::EcgError;
use crate::signal::LeadSignal;

/// Lead signals laid end to end in lead-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    /// Wraps values that were combined elsewhere, e.g. a row read back from a CSV.
    pub fn from_values(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Combines exactly 12 signals of 255 samples each.
pub fn combine(signals: &[LeadSignal]) -> Result<FeatureVector, EcgError> {
    combine_with(signals, LEAD_COUNT, SAMPLES_PER_LEAD)
}

/// Combines `lead_count` signals of `samples` values each, which must arrive as leads
/// 1..=lead_count in order.
pub fn combine_with(
    signals: &[LeadSignal],
    lead_count: usize,
    samples: usize,
) -> Result<FeatureVector, EcgError> {
    if signals.len() != lead_count {
        return Err(EcgError::FeatureCountMismatch(format!(
            "expected {lead_count} lead signals, got {}",
            signals.len()
        )));
    }

    let mut values = Vec::with_capacity(lead_count * samples);
    for (idx, signal) in signals.iter().enumerate() {
        if signal.lead != idx + 1 {
            return Err(EcgError::FeatureCountMismatch(format!(
                "lead {} supplied at position {}",
                signal.lead,
                idx + 1
            )));
        }
        if signal.len() != samples {
            return Err(EcgError::FeatureCountMismatch(format!(
                "lead {} has {} samples, expected {samples}",
                signal.lead,
                signal.len()
            )));
        }
        values.extend_from_slice(&signal.samples);
    }
    Ok(FeatureVector(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(count: usize) -> Vec<LeadSignal> {
        (1..=count)
            .map(|lead| LeadSignal {
                lead,
                samples: vec![lead as f64 / 100.0; SAMPLES_PER_LEAD],
            })
            .collect()
    }

    #[test]
    fn twelve_signals_make_3060_features() {
        let features = combine(&signals(12)).expect("combine");
        assert_eq!(features.len(), 3060);
        assert_eq!(features.as_slice()[0], 0.01);
        assert_eq!(features.as_slice()[SAMPLES_PER_LEAD], 0.02);
        assert_eq!(features.as_slice()[3059], 0.12);
    }

    #[test]
    fn wrong_count_is_rejected() {
        assert!(matches!(combine(&signals(11)), Err(EcgError::FeatureCountMismatch(_))));
        assert!(matches!(combine(&signals(13)), Err(EcgError::FeatureCountMismatch(_))));
    }

    #[test]
    fn short_or_misordered_signal_is_rejected() {
        let mut short = signals(12);
        short[5].samples.pop();
        assert!(matches!(combine(&short), Err(EcgError::FeatureCountMismatch(_))));

        let mut swapped = signals(12);
        swapped.swap(0, 1);
        assert!(matches!(combine(&swapped), Err(EcgError::FeatureCountMismatch(_))));
    }
}
