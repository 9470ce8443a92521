//! Centrality and variability summaries.
use super::quantile;
use crate::sort_f64;
use noisy_float::prelude::*;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Centrality {
    pub mean: f64,
    pub median: f64,
    /// The most frequent exact value; ties resolve to the smallest.
    pub mode: f64,
}

pub fn centrality(values: &[f64]) -> Option<Centrality> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(sort_f64);

    let mut counts: BTreeMap<N64, usize> = BTreeMap::new();
    for &value in values {
        *counts.entry(n64(value)).or_default() += 1;
    }
    let mut mode = f64::NAN;
    let mut best = 0;
    for (value, count) in counts {
        if count > best {
            best = count;
            mode = value.raw();
        }
    }

    Some(Centrality {
        mean: values.iter().mean(),
        median: quantile(&sorted, 0.5),
        mode,
    })
}

/// The interquartile range and its 1.5-IQR outlier fences.
#[derive(Debug, Clone, PartialEq)]
pub struct Spread {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

impl Spread {
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower_fence || value > self.upper_fence
    }
}

pub fn spread(values: &[f64]) -> Option<Spread> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(sort_f64);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    Some(Spread {
        q1,
        q3,
        iqr,
        lower_fence: q1 - 1.5 * iqr,
        upper_fence: q3 + 1.5 * iqr,
    })
}

/// The describe-style row printed under every variability section.
#[derive(Debug, Clone)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std_dev: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

pub fn summary(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(sort_f64);
    Some(Summary {
        count: values.len(),
        mean: values.iter().mean(),
        std_dev: values.iter().std_dev(),
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}
