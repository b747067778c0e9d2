use serde::{Deserialize, Serialize};

/// Held-out regression scores. `r2` is NaN when the actual values are constant;
/// all three are NaN for an empty partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub samples: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

pub fn evaluate(actual: &[f64], predicted: &[f64]) -> EvaluationMetrics {
    EvaluationMetrics {
        samples: actual.len().min(predicted.len()),
        mae: mean_absolute_error(actual, predicted),
        rmse: root_mean_squared_error(actual, predicted),
        r2: r2_score(actual, predicted),
    }
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    sum / actual.len() as f64
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sum / actual.len() as f64).sqrt()
}

pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() || actual.len() != predicted.len() {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return f64::NAN;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Three-decimal rendering used by the dashboard and reports; NaN shows as `n/a`.
pub fn format_metric(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.3}")
    } else {
        "n/a".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        let actual = [3.0, -0.5, 2.0, 7.0];
        let predicted = [2.5, 0.0, 2.0, 8.0];
        let m = evaluate(&actual, &predicted);
        assert!((m.mae - 0.5).abs() < 1e-12);
        assert!((m.rmse - 0.375_f64.sqrt()).abs() < 1e-12);
        assert!((m.r2 - 0.948_608_137_044_967_9).abs() < 1e-12);
        assert_eq!(m.samples, 4);
    }

    #[test]
    fn rmse_never_below_mae() {
        let actual = [1.0, 5.0, 2.0, 0.0, 12.0, -1.0];
        let predicted = [2.0, 3.5, 2.0, 1.0, 6.0, 0.0];
        let m = evaluate(&actual, &predicted);
        assert!(m.rmse >= m.mae);
    }

    #[test]
    fn constant_actuals_give_nan_r2() {
        let m = evaluate(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]);
        assert!(m.r2.is_nan());
        assert!(m.mae.is_finite());
        assert_eq!(format_metric(m.r2), "n/a");
        assert_eq!(format_metric(m.mae), "0.667");
    }

    #[test]
    fn empty_partition_is_nan() {
        let m = evaluate(&[], &[]);
        assert!(m.mae.is_nan() && m.rmse.is_nan() && m.r2.is_nan());
    }
}
