use crate::dataset::TextSample;
use crate::error::{AppError, Result};
use crate::models::{LabelDistribution, SeverityLabel, N_CLASSES};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How per-class weights are derived
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeights {
    /// `n_samples / (n_present_classes * class_count)`
    #[default]
    Balanced,
    /// Every class weighs 1
    Uniform,
    /// Explicit weight per class, in label order
    Manual([f64; N_CLASSES]),
}

impl ClassWeights {
    pub fn validate(&self) -> Result<()> {
        if let ClassWeights::Manual(weights) = self {
            if let Some(w) = weights.iter().find(|w| !(w.is_finite() && **w > 0.0)) {
                return Err(AppError::Configuration(format!(
                    "class weights must be positive, got {}",
                    w
                )));
            }
        }
        Ok(())
    }

    /// Resolve to one weight per class. Classes absent from the distribution
    /// get weight 1 under the balanced strategy.
    pub fn compute(&self, distribution: &LabelDistribution) -> [f64; N_CLASSES] {
        match self {
            ClassWeights::Uniform => [1.0; N_CLASSES],
            ClassWeights::Manual(weights) => *weights,
            ClassWeights::Balanced => {
                let present = distribution.present();
                let n_samples = distribution.total() as f64;
                let n_classes = present.len() as f64;

                let mut weights = [1.0; N_CLASSES];
                for label in present {
                    weights[label.index()] =
                        n_samples / (n_classes * distribution.count(label) as f64);
                }
                weights
            }
        }
    }
}

/// Duplicates random minority samples until every present class matches the
/// majority class count
#[derive(Debug, Clone)]
pub struct RandomOverSampler {
    seed: u64,
}

impl RandomOverSampler {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Original samples first, then the drawn duplicates class by class
    pub fn fit_resample(&self, samples: &[TextSample]) -> Vec<TextSample> {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut by_class: Vec<Vec<&TextSample>> = vec![Vec::new(); N_CLASSES];
        for sample in samples {
            by_class[sample.label.index()].push(sample);
        }
        let majority = by_class.iter().map(|c| c.len()).max().unwrap_or(0);

        let mut resampled: Vec<TextSample> = samples.to_vec();
        for (class, members) in by_class.iter().enumerate() {
            if members.is_empty() || members.len() == majority {
                continue;
            }
            let needed = majority - members.len();
            for _ in 0..needed {
                if let Some(sample) = members.choose(&mut rng) {
                    resampled.push((*sample).clone());
                }
            }
            debug!(
                class = SeverityLabel::from_index(class).map(|l| l.name()).unwrap_or("?"),
                added = needed,
                "Oversampled minority class"
            );
        }

        resampled
    }
}
