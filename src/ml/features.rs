use crate::error::{AppError, Result};
use crate::ml::models::{FeatureConfig, VectorizerKind};
use lazy_static::lazy_static;
use ndarray::{Array1, Array2, Axis};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

lazy_static! {
    /// Runs of two or more word characters
    static ref TOKEN_PATTERN: Regex = Regex::new(r"(?u)\b\w\w+\b").expect("valid token pattern");
}

/// Bag-of-words vectorizer over projected log text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextVectorizer {
    /// Configuration
    config: FeatureConfig,

    /// Weighting scheme
    kind: VectorizerKind,

    /// Vocabulary mapping (term -> column), columns in alphabetical term order
    vocabulary: HashMap<String, usize>,

    /// Inverse document frequency per column (TF-IDF only)
    idf: Vec<f64>,

    /// Is fitted (vocabulary built)
    is_fitted: bool,
}

impl TextVectorizer {
    /// Create a new vectorizer
    pub fn new(config: FeatureConfig, kind: VectorizerKind) -> Self {
        Self {
            config,
            kind,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
            is_fitted: false,
        }
    }

    /// Fit the vocabulary (and IDF weights) on a corpus
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<()> {
        if documents.is_empty() {
            return Err(AppError::Training(
                "cannot fit a vectorizer on an empty corpus".to_string(),
            ));
        }

        let mut term_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms = self.extract_terms(doc.as_ref());
            let unique: HashSet<&String> = terms.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            for term in terms {
                *term_freq.entry(term).or_insert(0) += 1;
            }
        }

        // Filter by document frequency, keep the most frequent terms
        let min_df = self.config.min_doc_freq;
        let mut candidates: Vec<(String, usize)> = term_freq
            .into_iter()
            .filter(|(term, _)| doc_freq.get(term).copied().unwrap_or(0) >= min_df)
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(self.config.max_features);

        let mut terms: Vec<String> = candidates.into_iter().map(|(t, _)| t).collect();
        terms.sort();

        if terms.is_empty() {
            return Err(AppError::Training(
                "empty vocabulary; documents contain no usable tokens".to_string(),
            ));
        }

        let n_docs = documents.len() as f64;
        self.idf = terms
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        self.vocabulary = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term, idx))
            .collect();
        self.is_fitted = true;

        Ok(())
    }

    /// Transform a corpus into a dense document-term matrix
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(AppError::Internal(
                "TextVectorizer must be fitted before transform".to_string(),
            ));
        }

        let mut matrix = Array2::zeros((documents.len(), self.vocabulary.len()));
        for (row, doc) in documents.iter().enumerate() {
            for term in self.extract_terms(doc.as_ref()) {
                if let Some(&col) = self.vocabulary.get(&term) {
                    matrix[[row, col]] += 1.0;
                }
            }
        }

        if self.kind == VectorizerKind::Tfidf {
            for mut row in matrix.axis_iter_mut(Axis(0)) {
                for (value, idf) in row.iter_mut().zip(self.idf.iter()) {
                    *value *= idf;
                }
                let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.mapv_inplace(|v| v / norm);
                }
            }
        }

        Ok(matrix)
    }

    /// Fit and transform in one step
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<Array2<f64>> {
        self.fit(documents)?;
        self.transform(documents)
    }

    /// Lower-cased tokens joined into the configured n-grams
    fn extract_terms(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let words: Vec<&str> = TOKEN_PATTERN.find_iter(&text).map(|m| m.as_str()).collect();

        let (min_n, max_n) = self.config.ngram_range;
        let mut terms = Vec::new();
        for n in min_n.max(1)..=max_n {
            for window in words.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    /// Vocabulary terms in column order
    pub fn feature_names(&self) -> Vec<String> {
        let ordered: BTreeMap<usize, &String> =
            self.vocabulary.iter().map(|(t, &i)| (i, t)).collect();
        ordered.into_values().cloned().collect()
    }

    pub fn kind(&self) -> VectorizerKind {
        self.kind
    }

    /// Check if fitted
    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Get vocabulary size
    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }
}

/// Scales columns to unit variance without centering, keeping sparse rows
/// sparse
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    scale: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, features: &Array2<f64>) -> Result<()> {
        if features.nrows() == 0 {
            return Err(AppError::Training(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }
        let std = features.std_axis(Axis(0), 0.0);
        self.scale = Some(std.mapv(|s| if s > 0.0 { s } else { 1.0 }));
        Ok(())
    }

    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let scale = self.scale.as_ref().ok_or_else(|| {
            AppError::Internal("StandardScaler must be fitted before transform".to_string())
        })?;
        if scale.len() != features.ncols() {
            return Err(AppError::Internal(format!(
                "scaler fitted on {} columns, got {}",
                scale.len(),
                features.ncols()
            )));
        }
        Ok(features / scale)
    }

    pub fn fit_transform(&mut self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(features)?;
        self.transform(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "3 kernel system b1 usb device error",
            "6 journal system b1 started session",
            "6 journal system b1 started user manager",
            "2 kernel system b1 fatal error in driver",
        ]
    }

    #[test]
    fn test_vectorizer_creation() {
        let vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Tfidf);
        assert!(!vectorizer.is_fitted());
        assert_eq!(vectorizer.vocab_size(), 0);
    }

    #[test]
    fn test_tokens_skip_single_characters() {
        let vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Count);
        let terms = vectorizer.extract_terms("6 Kernel b1 OOPS: x");
        assert_eq!(terms, vec!["kernel", "b1", "oops"]);
    }

    #[test]
    fn test_count_vectorizer() {
        let mut vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Count);
        let matrix = vectorizer.fit_transform(&["error error disk", "disk ok"]).unwrap();

        assert_eq!(vectorizer.feature_names(), vec!["disk", "error", "ok"]);
        assert_eq!(matrix.row(0).to_vec(), vec![1.0, 2.0, 0.0]);
        assert_eq!(matrix.row(1).to_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_tfidf_rows_are_unit_length() {
        let mut vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Tfidf);
        let matrix = vectorizer.fit_transform(&corpus()).unwrap();

        for row in matrix.axis_iter(Axis(0)) {
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tfidf_downweights_common_terms() {
        let mut vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Tfidf);
        let matrix = vectorizer.fit_transform(&corpus()).unwrap();
        let names = vectorizer.feature_names();

        let system = names.iter().position(|n| n == "system").unwrap();
        let fatal = names.iter().position(|n| n == "fatal").unwrap();
        assert!(matrix[[3, fatal]] > matrix[[3, system]]);
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let config = FeatureConfig {
            max_features: 2,
            ..FeatureConfig::default()
        };
        let mut vectorizer = TextVectorizer::new(config, VectorizerKind::Count);
        vectorizer.fit(&corpus()).unwrap();

        assert_eq!(vectorizer.feature_names(), vec!["b1", "system"]);
    }

    #[test]
    fn test_unknown_terms_ignored() {
        let mut vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Count);
        vectorizer.fit(&["disk error"]).unwrap();
        let matrix = vectorizer.transform(&["network timeout"]).unwrap();
        assert_eq!(matrix.sum(), 0.0);
    }

    #[test]
    fn test_bigrams() {
        let config = FeatureConfig {
            ngram_range: (1, 2),
            ..FeatureConfig::default()
        };
        let mut vectorizer = TextVectorizer::new(config, VectorizerKind::Count);
        vectorizer.fit(&["disk read error"]).unwrap();
        assert!(vectorizer.feature_names().contains(&"read error".to_string()));
    }

    #[test]
    fn test_transform_requires_fit() {
        let vectorizer = TextVectorizer::new(FeatureConfig::default(), VectorizerKind::Count);
        assert!(vectorizer.transform(&["x"]).is_err());
    }

    #[test]
    fn test_standard_scaler() {
        let features =
            Array2::from_shape_vec((4, 2), vec![0.0, 5.0, 2.0, 5.0, 0.0, 5.0, 2.0, 5.0]).unwrap();
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&features).unwrap();

        // First column has std 1, constant column keeps its values
        assert_eq!(scaled.column(0).to_vec(), vec![0.0, 2.0, 0.0, 2.0]);
        assert_eq!(scaled.column(1).to_vec(), vec![5.0, 5.0, 5.0, 5.0]);
    }
}
