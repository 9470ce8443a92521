//! Logistic regression of the death flag, with class rebalancing.
//!
//! Deaths are a few percent of records, so the classifier trains on a
//! SMOTE-balanced sample and additionally weights classes inversely to
//! their frequency. Fitting is Newton iteration on the weighted
//! log-likelihood, reusing the linear solver; a vanishing ridge keeps the
//! Hessian invertible near separation.
use super::regression::solve;
use crate::PipelineError;
use qu::ick_use::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Centre/scale columns to zero mean and unit sample variance.
///
/// Fit on training rows, then apply to both sides of the split. Constant
/// columns (a rare one-hot level can be absent from the training side) are
/// left centred but unscaled.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        assert!(!rows.is_empty(), "cannot fit a scaler to no rows");
        let cols = rows[0].len();
        let n = rows.len() as f64;
        let mut means = vec![0.0; cols];
        for row in rows {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / n;
            }
        }
        let mut scales = vec![0.0; cols];
        for row in rows {
            for ((scale, mean), value) in scales.iter_mut().zip(&means).zip(row) {
                *scale += (value - mean) * (value - mean) / n;
            }
        }
        for scale in &mut scales {
            *scale = scale.sqrt();
            if *scale == 0.0 {
                *scale = 1.0;
            }
        }
        Self { means, scales }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(&self.means)
                    .zip(&self.scales)
                    .map(|((value, mean), scale)| (value - mean) / scale)
                    .collect()
            })
            .collect()
    }
}

/// Synthetic minority oversampling: interpolate between a minority row and
/// one of its `k` nearest minority neighbours until the classes balance.
///
/// Returns the training rows with the synthetic rows appended. Deterministic
/// for a given seed.
pub fn smote(
    rows: &[Vec<f64>],
    labels: &[bool],
    k: usize,
    seed: u64,
) -> Result<(Vec<Vec<f64>>, Vec<bool>), PipelineError> {
    assert_eq!(rows.len(), labels.len(), "rows and labels must align");
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(PipelineError::Computation(
            "oversampling needs at least one sample of each class".to_string(),
        ));
    }
    let minority_label = positives < negatives;
    let minority: Vec<&Vec<f64>> = rows
        .iter()
        .zip(labels)
        .filter(|(_, &l)| l == minority_label)
        .map(|(r, _)| r)
        .collect();
    let need = negatives.abs_diff(positives);

    let mut out_rows = rows.to_vec();
    let mut out_labels = labels.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..need {
        let base = rng.gen_range(0..minority.len());
        let neighbour = if minority.len() == 1 {
            base
        } else {
            let mut order: Vec<usize> = (0..minority.len()).filter(|&i| i != base).collect();
            order.sort_by(|&a, &b| {
                distance(minority[base], minority[a])
                    .partial_cmp(&distance(minority[base], minority[b]))
                    .unwrap()
            });
            order[rng.gen_range(0..k.min(order.len()))]
        };
        let t: f64 = rng.gen();
        let synthetic = minority[base]
            .iter()
            .zip(minority[neighbour])
            .map(|(a, b)| a + t * (b - a))
            .collect();
        out_rows.push(synthetic);
        out_labels.push(minority_label);
    }
    Ok((out_rows, out_labels))
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
}

#[derive(Debug, Clone)]
pub struct LogisticFit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl LogisticFit {
    pub fn probability(&self, row: &[f64]) -> f64 {
        let z = self.intercept
            + row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, b)| x * b)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }

    pub fn predict(&self, row: &[f64]) -> bool {
        self.probability(row) >= 0.5
    }
}

/// Fit by Newton iteration with balanced class weights.
pub fn fit(
    rows: &[Vec<f64>],
    labels: &[bool],
    max_iterations: usize,
) -> Result<LogisticFit, PipelineError> {
    assert_eq!(rows.len(), labels.len(), "rows and labels must align");
    let n = rows.len();
    let positives = labels.iter().filter(|&&l| l).count();
    if positives == 0 || positives == n {
        return Err(PipelineError::Computation(
            "logistic fit needs both outcome classes".to_string(),
        ));
    }
    let p = rows[0].len() + 1; // plus intercept
    if n < p {
        return Err(PipelineError::Computation(format!(
            "{} rows cannot determine {} logistic parameters",
            n, p
        )));
    }

    // balanced weights: n / (2 * class size)
    let weight_pos = n as f64 / (2.0 * positives as f64);
    let weight_neg = n as f64 / (2.0 * (n - positives) as f64);

    const RIDGE: f64 = 1e-8;
    let mut beta = vec![0.0; p];
    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;
        // gradient and Hessian of the weighted log-likelihood
        let mut grad = vec![0.0; p];
        let mut hess = vec![vec![0.0; p]; p];
        for (row, &label) in rows.iter().zip(labels) {
            let z = beta[0]
                + row
                    .iter()
                    .zip(&beta[1..])
                    .map(|(x, b)| x * b)
                    .sum::<f64>();
            let prob = 1.0 / (1.0 + (-z).exp());
            let weight = if label { weight_pos } else { weight_neg };
            let residual = weight * ((label as u8 as f64) - prob);
            let curvature = weight * prob * (1.0 - prob);
            for i in 0..p {
                let xi = if i == 0 { 1.0 } else { row[i - 1] };
                grad[i] += residual * xi;
                for j in i..p {
                    let xj = if j == 0 { 1.0 } else { row[j - 1] };
                    hess[i][j] += curvature * xi * xj;
                }
            }
        }
        for i in 0..p {
            hess[i][i] += RIDGE;
            for j in 0..i {
                hess[i][j] = hess[j][i];
            }
        }

        let step = solve(hess, grad)?;
        let mut max_step = 0.0f64;
        for (b, s) in beta.iter_mut().zip(&step) {
            *b += s;
            max_step = max_step.max(s.abs());
        }
        if max_step < 1e-8 {
            converged = true;
            break;
        }
    }
    if !converged {
        event!(
            Level::WARN,
            "logistic fit did not converge in {} iterations",
            iterations
        );
    }
    Ok(LogisticFit {
        intercept: beta[0],
        coefficients: beta[1..].to_vec(),
        iterations,
        converged,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

pub fn confusion_matrix(actual: &[bool], predicted: &[bool]) -> ConfusionMatrix {
    assert_eq!(actual.len(), predicted.len(), "columns must align");
    let mut cm = ConfusionMatrix {
        true_negative: 0,
        false_positive: 0,
        false_negative: 0,
        true_positive: 0,
    };
    for (&a, &p) in actual.iter().zip(predicted) {
        match (a, p) {
            (false, false) => cm.true_negative += 1,
            (false, true) => cm.false_positive += 1,
            (true, false) => cm.false_negative += 1,
            (true, true) => cm.true_positive += 1,
        }
    }
    cm
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    pub fn accuracy(&self) -> f64 {
        (self.true_negative + self.true_positive) as f64 / self.total() as f64
    }
}

/// Precision/recall/F1 for one outcome class.
#[derive(Debug, Clone)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

fn class_metrics(tp: usize, fp: usize, fn_: usize) -> ClassMetrics {
    let precision = if tp + fp == 0 {
        0.0
    } else {
        tp as f64 / (tp + fp) as f64
    };
    let recall = if tp + fn_ == 0 {
        0.0
    } else {
        tp as f64 / (tp + fn_) as f64
    };
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub survived: ClassMetrics,
    pub died: ClassMetrics,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub weighted_f1: f64,
}

pub fn classification_report(cm: &ConfusionMatrix) -> ClassificationReport {
    let died = class_metrics(cm.true_positive, cm.false_positive, cm.false_negative);
    let survived = class_metrics(cm.true_negative, cm.false_negative, cm.false_positive);
    let total = cm.total() as f64;
    ClassificationReport {
        accuracy: cm.accuracy(),
        macro_f1: (survived.f1 + died.f1) / 2.0,
        weighted_f1: (survived.f1 * survived.support as f64 + died.f1 * died.support as f64)
            / total,
        survived,
        died,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scaler_centres_and_scales() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let scaler = StandardScaler::fit(&rows);
        let out = scaler.transform(&rows);
        let mean: f64 = out.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
        // constant column is centred but not rescaled
        assert!(out.iter().all(|r| r[1] == 0.0));
        assert!(out[0][0] < 0.0 && out[2][0] > 0.0);
    }

    #[test]
    fn smote_balances_the_classes() {
        let rows = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![1.0, 1.0],
            vec![1.1, 1.0],
            vec![5.0, 5.0],
        ];
        let labels = vec![false, false, false, false, false, true];
        let (out_rows, out_labels) = smote(&rows, &labels, 5, 0).unwrap();
        let positives = out_labels.iter().filter(|&&l| l).count();
        let negatives = out_labels.len() - positives;
        assert_eq!(positives, negatives);
        // a lone minority point can only replicate itself
        assert!(out_rows[6..].iter().all(|r| r == &vec![5.0, 5.0]));
    }

    #[test]
    fn smote_interpolates_between_minority_points() {
        let rows = vec![
            vec![0.0],
            vec![0.0],
            vec![0.0],
            vec![0.0],
            vec![1.0],
            vec![2.0],
        ];
        let labels = vec![false, false, false, false, true, true];
        let (out_rows, out_labels) = smote(&rows, &labels, 5, 42).unwrap();
        assert_eq!(out_labels.iter().filter(|&&l| l).count(), 4);
        for row in &out_rows[6..] {
            assert!((1.0..=2.0).contains(&row[0]));
        }
    }

    #[test]
    fn smote_needs_both_classes() {
        let err = smote(&[vec![0.0]], &[true], 5, 0).unwrap_err();
        assert!(matches!(err, PipelineError::Computation(_)));
    }

    #[test]
    fn logistic_separates_overlapping_classes() {
        // outcome depends on the feature with noise; the fit should find a
        // strongly positive slope and get the clear cases right
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64 / 10.0 - 2.0])
            .collect();
        let labels: Vec<bool> = (0..40).map(|i| i >= 18 && i != 19 && i != 21 || i == 16).collect();
        let fit = super::fit(&rows, &labels, 100).unwrap();
        assert!(fit.converged);
        assert!(fit.coefficients[0] > 0.0);
        assert!(!fit.predict(&[-1.9]));
        assert!(fit.predict(&[1.9]));
    }

    #[test]
    fn confusion_matrix_counts() {
        let actual = [true, true, false, false, true];
        let predicted = [true, false, false, true, true];
        let cm = confusion_matrix(&actual, &predicted);
        assert_eq!(cm.true_positive, 2);
        assert_eq!(cm.false_negative, 1);
        assert_eq!(cm.true_negative, 1);
        assert_eq!(cm.false_positive, 1);
        assert_eq!(cm.accuracy(), 0.6);
    }

    #[test]
    fn classification_report_for_a_perfect_classifier() {
        let cm = confusion_matrix(&[true, false, false], &[true, false, false]);
        let report = classification_report(&cm);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.died.precision, 1.0);
        assert_eq!(report.died.recall, 1.0);
        assert_eq!(report.survived.f1, 1.0);
        assert_eq!(report.died.support, 1);
        assert_eq!(report.survived.support, 2);
    }
}
