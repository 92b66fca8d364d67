//! Classification metrics and their text renderings

use crate::ml::models::{AverageMetrics, ClassMetrics, ModelMetrics, ModelType};
use crate::models::{SeverityLabel, N_CLASSES};
use std::fmt::Write;

/// Value used for precision/recall when the denominator is zero
pub const DEFAULT_ZERO_DIVISION: f64 = 1.0;

/// Confusion matrix over all four classes, rows are true labels
pub fn confusion_matrix(y_true: &[SeverityLabel], y_pred: &[SeverityLabel]) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0usize; N_CLASSES]; N_CLASSES];
    for (t, p) in y_true.iter().zip(y_pred.iter()) {
        matrix[t.index()][p.index()] += 1;
    }
    matrix
}

fn ratio(numerator: usize, denominator: usize, zero_division: f64) -> f64 {
    if denominator == 0 {
        zero_division
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Evaluate predictions against ground truth.
///
/// Per-class rows cover every class seen in either sequence. Macro averages
/// are unweighted means over those rows; the top-level precision, recall and
/// F1 are weighted by support.
pub fn evaluate(y_true: &[SeverityLabel], y_pred: &[SeverityLabel], zero_division: f64) -> ModelMetrics {
    let n_samples = y_true.len().min(y_pred.len());
    if n_samples == 0 {
        return ModelMetrics::new();
    }

    let matrix = confusion_matrix(y_true, y_pred);
    let correct: usize = (0..N_CLASSES).map(|k| matrix[k][k]).sum();

    let mut per_class = Vec::new();
    for label in SeverityLabel::all() {
        let k = label.index();
        let support: usize = matrix[k].iter().sum();
        let predicted: usize = matrix.iter().map(|row| row[k]).sum();
        if support == 0 && predicted == 0 {
            continue;
        }

        let tp = matrix[k][k];
        let precision = ratio(tp, predicted, zero_division);
        let recall = ratio(tp, support, zero_division);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        per_class.push(ClassMetrics {
            label,
            precision,
            recall,
            f1_score,
            support,
        });
    }

    let n_reported = per_class.len() as f64;
    let macro_avg = AverageMetrics {
        precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n_reported,
        recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n_reported,
        f1_score: per_class.iter().map(|m| m.f1_score).sum::<f64>() / n_reported,
    };

    let total_support = per_class.iter().map(|m| m.support).sum::<usize>() as f64;
    let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
        if total_support == 0.0 {
            return 0.0;
        }
        per_class
            .iter()
            .map(|m| f(m) * m.support as f64)
            .sum::<f64>()
            / total_support
    };

    ModelMetrics {
        accuracy: correct as f64 / n_samples as f64,
        precision: weighted(|m| m.precision),
        recall: weighted(|m| m.recall),
        f1_score: weighted(|m| m.f1_score),
        macro_avg,
        confusion_matrix: matrix,
        per_class_metrics: per_class,
        n_samples,
    }
}

/// Text report with one row per class plus accuracy and averages
pub fn classification_report(metrics: &ModelMetrics) -> String {
    let width = SeverityLabel::all()
        .iter()
        .map(|l| l.name().len())
        .max()
        .unwrap_or(0)
        .max("weighted avg".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>width$} {:>9} {:>9} {:>9} {:>9}",
        "", "precision", "recall", "f1-score", "support"
    );
    let _ = writeln!(out);

    for class in &metrics.per_class_metrics {
        let _ = writeln!(
            out,
            "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            class.label.name(),
            class.precision,
            class.recall,
            class.f1_score,
            class.support
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
        "accuracy", "", "", metrics.accuracy, metrics.n_samples
    );
    for (name, avg) in [
        ("macro avg", metrics.macro_avg),
        ("weighted avg", metrics.weighted_avg()),
    ] {
        let _ = writeln!(
            out,
            "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
            name, avg.precision, avg.recall, avg.f1_score, metrics.n_samples
        );
    }

    out
}

/// Confusion matrix as an aligned table with class names on both axes
pub fn format_confusion_matrix(matrix: &[Vec<usize>]) -> String {
    let names: Vec<&str> = SeverityLabel::all().iter().map(|l| l.name()).collect();
    let width = names.iter().map(|n| n.len()).max().unwrap_or(0);

    let mut out = String::new();
    let _ = write!(out, "{:>width$}", "true \\ pred");
    for name in &names {
        let _ = write!(out, " {:>width$}", name);
    }
    let _ = writeln!(out);

    for (name, row) in names.iter().zip(matrix.iter()) {
        let _ = write!(out, "{:>width$}", name);
        for count in row {
            let _ = write!(out, " {:>width$}", count);
        }
        let _ = writeln!(out);
    }

    out
}

/// Accuracy and weighted precision/recall/F1 side by side
pub fn comparison_table(results: &[(ModelType, &ModelMetrics)]) -> String {
    let width = results
        .iter()
        .map(|(m, _)| m.to_string().len())
        .max()
        .unwrap_or(0)
        .max("model".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$} {:>9} {:>9} {:>9} {:>9}",
        "model", "accuracy", "precision", "recall", "f1-score"
    );
    for (model, metrics) in results {
        let _ = writeln!(
            out,
            "{:<width$} {:>9.4} {:>9.4} {:>9.4} {:>9.4}",
            model.to_string(),
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1_score
        );
    }
    out
}
