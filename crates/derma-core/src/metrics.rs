//! Classification metrics: confusion matrix, per-class precision/recall/F1
//! and the text report printed after every evaluation pass.

use serde::{Deserialize, Serialize};

/// Confusion matrix for multi-class classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted)
    /// Stored as a flat vector in row-major order
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Add a single prediction to the matrix. Out-of-range labels are ignored.
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually other classes
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as other classes
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

/// Averaged precision/recall/F1 row of a report
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class precision/recall/F1 report with macro and weighted averages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub class_names: Vec<String>,
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub total_support: usize,
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationReport {
    /// Build a report over every class in `class_names`, including classes
    /// with no support (their scores are 0 and count toward the macro average).
    pub fn from_predictions(predictions: &[usize], ground_truth: &[usize], class_names: &[&str]) -> Self {
        let num_classes = class_names.len();
        let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        let total_support: usize = per_class.iter().map(|m| m.support).sum();

        let macro_avg = if num_classes > 0 {
            let n = num_classes as f64;
            AveragedMetrics {
                precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
                recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
                f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            }
        } else {
            AveragedMetrics::default()
        };

        let weighted_avg = if total_support > 0 {
            let weight = |value: fn(&ClassMetrics) -> f64| {
                per_class
                    .iter()
                    .map(|m| value(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            };
            AveragedMetrics {
                precision: weight(|m| m.precision),
                recall: weight(|m| m.recall),
                f1: weight(|m| m.f1),
            }
        } else {
            AveragedMetrics::default()
        };

        Self {
            class_names: class_names.iter().map(|s| s.to_string()).collect(),
            per_class,
            accuracy: confusion_matrix.accuracy(),
            macro_avg,
            weighted_avg,
            total_support,
            confusion_matrix,
        }
    }

    /// Render the report as an aligned text table with `digits` decimals
    pub fn render(&self, digits: usize) -> String {
        let width = self
            .class_names
            .iter()
            .map(|name| name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(0)
            .max(digits);
        let col = digits.max(9) + 1;

        let mut out = String::new();
        out.push_str(&format!(
            "{:>width$}{:>col$}{:>col$}{:>col$}{:>col$}\n\n",
            "", "precision", "recall", "f1-score", "support"
        ));

        for (name, m) in self.class_names.iter().zip(&self.per_class) {
            out.push_str(&format!(
                "{:>width$}{:>col$.digits$}{:>col$.digits$}{:>col$.digits$}{:>col$}\n",
                name, m.precision, m.recall, m.f1, m.support
            ));
        }
        out.push('\n');

        out.push_str(&format!(
            "{:>width$}{:>col$}{:>col$}{:>col$.digits$}{:>col$}\n",
            "accuracy", "", "", self.accuracy, self.total_support
        ));
        for (label, avg) in [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)] {
            out.push_str(&format!(
                "{:>width$}{:>col$.digits$}{:>col$.digits$}{:>col$.digits$}{:>col$}\n",
                label, avg.precision, avg.recall, avg.f1, self.total_support
            ));
        }

        out
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(4))
    }
}
