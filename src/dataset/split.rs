use crate::dataset::TextSample;
use crate::error::{AppError, Result};
use crate::models::{SeverityLabel, N_CLASSES};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Train/test partition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train: Vec<TextSample>,
    pub test: Vec<TextSample>,
}

impl DatasetSplit {
    pub fn train_labels(&self) -> Vec<SeverityLabel> {
        self.train.iter().map(|s| s.label).collect()
    }

    pub fn test_labels(&self) -> Vec<SeverityLabel> {
        self.test.iter().map(|s| s.label).collect()
    }
}

/// Split samples into train and test sets.
///
/// Features and labels move together. With `stratify`, each class is split
/// separately so both sides keep the class proportions; every class with at
/// least two samples keeps one in the training set.
pub fn train_test_split(
    samples: &[TextSample],
    test_size: f64,
    seed: u64,
    stratify: bool,
) -> Result<DatasetSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(AppError::Validation(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    if samples.len() < 2 {
        return Err(AppError::Validation(format!(
            "at least 2 samples are needed to split, got {}",
            samples.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let (mut train_idx, mut test_idx) = if stratify {
        stratified_indices(samples, test_size, &mut rng)
    } else {
        shuffled_indices(samples.len(), test_size, &mut rng)
    };

    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    debug!(
        train = train_idx.len(),
        test = test_idx.len(),
        stratify,
        "Split dataset"
    );

    Ok(DatasetSplit {
        train: train_idx.iter().map(|&i| samples[i].clone()).collect(),
        test: test_idx.iter().map(|&i| samples[i].clone()).collect(),
    })
}

fn shuffled_indices(n: usize, test_size: f64, rng: &mut StdRng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);
    let train = indices.split_off(n_test);
    (train, indices)
}

fn stratified_indices(
    samples: &[TextSample],
    test_size: f64,
    rng: &mut StdRng,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); N_CLASSES];
    for (i, sample) in samples.iter().enumerate() {
        by_class[sample.label.index()].push(i);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();

    for class_indices in by_class.iter_mut() {
        let n = class_indices.len();
        if n == 0 {
            continue;
        }
        class_indices.shuffle(rng);

        let n_test = if n == 1 {
            0
        } else {
            ((n as f64 * test_size).round() as usize).min(n - 1)
        };
        test.extend_from_slice(&class_indices[..n_test]);
        train.extend_from_slice(&class_indices[n_test..]);
    }

    // Tiny classes can round every test share down to zero
    if test.is_empty() {
        let largest = by_class
            .iter()
            .filter(|c| c.len() > 1)
            .max_by_key(|c| c.len())
            .or_else(|| by_class.iter().filter(|c| !c.is_empty()).last());
        if let Some(&moved) = largest.and_then(|c| c.last()) {
            train.retain(|&i| i != moved);
            test.push(moved);
        }
    }

    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelDistribution;

    fn samples(counts: [usize; N_CLASSES]) -> Vec<TextSample> {
        let mut out = Vec::new();
        for (class, &count) in counts.iter().enumerate() {
            for i in 0..count {
                out.push(TextSample::new(
                    format!("class{} sample{}", class, i),
                    SeverityLabel::from_index(class).unwrap(),
                ));
            }
        }
        out
    }

    #[test]
    fn test_stratified_split_preserves_proportions() {
        let data = samples([80, 10, 5, 5]);
        let split = train_test_split(&data, 0.2, 42, true).unwrap();

        let test_dist = LabelDistribution::from_labels(&split.test_labels());
        assert_eq!(test_dist.counts, [16, 2, 1, 1]);
        assert_eq!(split.train.len() + split.test.len(), 100);
    }

    #[test]
    fn test_split_keeps_pairs_together() {
        let data = samples([20, 20, 0, 0]);
        let split = train_test_split(&data, 0.25, 7, true).unwrap();

        for sample in split.train.iter().chain(split.test.iter()) {
            let expected = format!("class{}", sample.label.index());
            assert!(sample.text.starts_with(&expected));
        }
    }

    #[test]
    fn test_split_is_reproducible() {
        let data = samples([30, 10, 6, 4]);
        let a = train_test_split(&data, 0.2, 42, true).unwrap();
        let b = train_test_split(&data, 0.2, 42, true).unwrap();
        assert_eq!(a.test, b.test);
        assert_eq!(a.train, b.train);
    }

    #[test]
    fn test_singleton_class_stays_in_train() {
        let data = samples([10, 1, 0, 0]);
        let split = train_test_split(&data, 0.2, 1, true).unwrap();
        assert!(split.train_labels().contains(&SeverityLabel::LowAnomaly));
        assert!(!split.test_labels().contains(&SeverityLabel::LowAnomaly));
    }

    #[test]
    fn test_tiny_dataset_still_has_test_sample() {
        let data = samples([2, 1, 0, 0]);
        let split = train_test_split(&data, 0.1, 3, true).unwrap();
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 2);
    }

    #[test]
    fn test_unstratified_split_sizes() {
        let data = samples([50, 50, 0, 0]);
        let split = train_test_split(&data, 0.2, 42, false).unwrap();
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
    }

    #[test]
    fn test_invalid_arguments() {
        let data = samples([5, 5, 0, 0]);
        assert!(train_test_split(&data, 0.0, 42, true).is_err());
        assert!(train_test_split(&data, 1.0, 42, true).is_err());
        assert!(train_test_split(&samples([1, 0, 0, 0]), 0.2, 42, true).is_err());
    }
}
