use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// Number of severity classes
pub const N_CLASSES: usize = 4;

/// Anomaly severity assigned to a log record.
///
/// Closed ordinal scale: the discriminant is the class index handed to the
/// classifiers, so ordering comparisons follow severity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLabel {
    #[strum(to_string = "No Anomaly", serialize = "none")]
    NoAnomaly = 0,
    #[strum(to_string = "Low Anomaly", serialize = "low")]
    LowAnomaly = 1,
    #[strum(to_string = "Medium Anomaly", serialize = "medium")]
    MediumAnomaly = 2,
    #[strum(to_string = "High Anomaly", serialize = "high")]
    HighAnomaly = 3,
}

impl SeverityLabel {
    /// Numeric class index (0-3)
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label for a class index, `None` outside 0-3
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(SeverityLabel::NoAnomaly),
            1 => Some(SeverityLabel::LowAnomaly),
            2 => Some(SeverityLabel::MediumAnomaly),
            3 => Some(SeverityLabel::HighAnomaly),
            _ => None,
        }
    }

    /// Human readable class name
    pub fn name(self) -> &'static str {
        match self {
            SeverityLabel::NoAnomaly => "No Anomaly",
            SeverityLabel::LowAnomaly => "Low Anomaly",
            SeverityLabel::MediumAnomaly => "Medium Anomaly",
            SeverityLabel::HighAnomaly => "High Anomaly",
        }
    }

    /// All labels in ascending severity
    pub fn all() -> Vec<SeverityLabel> {
        SeverityLabel::iter().collect()
    }

    /// Class names in index order
    pub fn class_names() -> [&'static str; N_CLASSES] {
        [
            SeverityLabel::NoAnomaly.name(),
            SeverityLabel::LowAnomaly.name(),
            SeverityLabel::MediumAnomaly.name(),
            SeverityLabel::HighAnomaly.name(),
        ]
    }

    /// Whether any anomaly was detected
    pub fn is_anomalous(self) -> bool {
        self != SeverityLabel::NoAnomaly
    }
}

impl From<SeverityLabel> for u8 {
    fn from(label: SeverityLabel) -> Self {
        label as u8
    }
}

/// Per-class counts, indexed by `SeverityLabel::index`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub counts: [usize; N_CLASSES],
}

impl LabelDistribution {
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a SeverityLabel>,
    {
        let mut distribution = Self::default();
        for label in labels {
            distribution.record(*label);
        }
        distribution
    }

    pub fn record(&mut self, label: SeverityLabel) {
        self.counts[label.index()] += 1;
    }

    pub fn count(&self, label: SeverityLabel) -> usize {
        self.counts[label.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Labels with at least one sample
    pub fn present(&self) -> Vec<SeverityLabel> {
        SeverityLabel::iter().filter(|l| self.count(*l) > 0).collect()
    }
}
