//! Descriptive statistics for the delta report.
//!
//! Mirrors the usual describe() summary: non-null count, mean, sample
//! standard deviation, min, quartiles with linear interpolation, max.
//! Every statistic is rounded to two decimal places for display.

/// Summary of one numeric column with nulls.
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    /// Number of non-null values
    pub count: u64,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Sample standard deviation (null when fewer than two values)
    pub std: Option<f64>,
    /// Smallest value
    pub min: Option<f64>,
    /// 25th percentile
    pub q1: Option<f64>,
    /// Median
    pub median: Option<f64>,
    /// 75th percentile
    pub q3: Option<f64>,
    /// Largest value
    pub max: Option<f64>,
}

/// Summarize a column of possibly-null values. Nulls are excluded from
/// every statistic; an all-null column reports count 0 and null everywhere
/// else.
pub fn describe(values: &[Option<f64>]) -> Describe {
    let mut present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let count = present.len() as u64;
    if present.is_empty() {
        return Describe {
            count,
            mean: None,
            std: None,
            min: None,
            q1: None,
            median: None,
            q3: None,
            max: None,
        };
    }

    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let std = if present.len() < 2 {
        None
    } else {
        let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(variance.sqrt())
    };

    Describe {
        count,
        mean: Some(round2(mean)),
        std: std.map(round2),
        min: Some(round2(present[0])),
        q1: Some(round2(quantile(&present, 0.25))),
        median: Some(round2(quantile(&present, 0.5))),
        q3: Some(round2(quantile(&present, 0.75))),
        max: Some(round2(present[present.len() - 1])),
    }
}

/// Quantile by linear interpolation between closest ranks; `sorted` must be
/// non-empty and ascending.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
