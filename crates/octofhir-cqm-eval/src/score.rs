//! Score arithmetic
//!
//! Pure functions shared by group and stratum scoring. "No score" is `None`,
//! never zero and never an error.

use octofhir_cqm_types::{AggregateMethod, ImprovementNotation};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::error::{MeasureError, MeasureResult};

/// `(n − nx) / (d − dx − dex)`, or `None` when the divisor is zero
pub fn proportion_score(
    numerator: usize,
    numerator_exclusion: usize,
    denominator: usize,
    denominator_exclusion: usize,
    denominator_exception: usize,
) -> Option<f64> {
    let dividend = numerator as i64 - numerator_exclusion as i64;
    let divisor =
        denominator as i64 - denominator_exclusion as i64 - denominator_exception as i64;
    if divisor == 0 {
        return None;
    }
    Some(dividend as f64 / divisor as f64)
}

/// Ratio of two observation aggregates
pub fn ratio_score(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (numerator, denominator) = (numerator?, denominator?);
    if denominator == 0.0 {
        return None;
    }
    if numerator == 0.0 && denominator > 0.0 {
        return Some(0.0);
    }
    Some(numerator / denominator)
}

/// Aggregate observation values. Empty input is "no score" for every
/// method; a non-empty input without a method is a configuration error.
pub fn aggregate(values: &[f64], method: AggregateMethod) -> MeasureResult<Option<f64>> {
    if values.is_empty() {
        return Ok(None);
    }
    let result = match method {
        AggregateMethod::NotApplicable => return Err(MeasureError::MissingAggregateMethod),
        AggregateMethod::Sum => sum(values),
        AggregateMethod::Average => sum(values) / values.len() as f64,
        AggregateMethod::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        AggregateMethod::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        AggregateMethod::Median => median(values),
        AggregateMethod::Count => values.len() as f64,
    };
    Ok(Some(result))
}

/// Report `1 − score` for decreasing measures; a missing or negative score
/// stays missing
pub fn apply_improvement_notation(score: Option<f64>, notation: ImprovementNotation) -> Option<f64> {
    let score = score?;
    if score < 0.0 {
        return None;
    }
    match notation {
        ImprovementNotation::Increase => Some(score),
        ImprovementNotation::Decrease => Some(1.0 - score),
    }
}

/// Decimal sum, so that `0.1 + 0.2` is `0.3`; falls back to floating point
/// outside the decimal range
fn sum(values: &[f64]) -> f64 {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, value| {
            acc.checked_add(Decimal::from_f64(*value)?)
        })
        .and_then(|total| total.to_f64())
        .unwrap_or_else(|| values.iter().sum())
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[middle - 1] + sorted[middle]) / 2.0
    } else {
        sorted[middle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AggregateMethod::Sum, 12.0)]
    #[case(AggregateMethod::Average, 4.0)]
    #[case(AggregateMethod::Min, 2.0)]
    #[case(AggregateMethod::Max, 6.0)]
    #[case(AggregateMethod::Median, 4.0)]
    #[case(AggregateMethod::Count, 3.0)]
    fn test_aggregate(#[case] method: AggregateMethod, #[case] expected: f64) {
        assert_eq!(aggregate(&[2.0, 4.0, 6.0], method).unwrap(), Some(expected));
    }

    #[test]
    fn test_even_median() {
        assert_eq!(
            aggregate(&[8.0, 2.0, 6.0, 4.0], AggregateMethod::Median).unwrap(),
            Some(5.0)
        );
    }

    #[test]
    fn test_empty_is_no_score() {
        for method in AggregateMethod::ALL {
            assert_eq!(aggregate(&[], *method).unwrap(), None);
        }
    }

    #[test]
    fn test_missing_method() {
        assert!(matches!(
            aggregate(&[1.0], AggregateMethod::NotApplicable),
            Err(MeasureError::MissingAggregateMethod)
        ));
    }

    #[test]
    fn test_decimal_sum() {
        assert_eq!(aggregate(&[0.1, 0.2], AggregateMethod::Sum).unwrap(), Some(0.3));
    }

    #[test]
    fn test_ratio_edges() {
        assert_eq!(ratio_score(Some(0.0), Some(5.0)), Some(0.0));
        assert_eq!(ratio_score(Some(3.0), Some(0.0)), None);
        assert_eq!(ratio_score(Some(3.0), Some(6.0)), Some(0.5));
        assert_eq!(ratio_score(None, Some(6.0)), None);
    }

    #[test]
    fn test_proportion() {
        assert_eq!(proportion_score(3, 1, 5, 1, 0), Some(0.5));
        assert_eq!(proportion_score(0, 0, 2, 1, 1), None);
        assert_eq!(proportion_score(0, 0, 4, 0, 0), Some(0.0));
    }

    #[test]
    fn test_improvement_notation() {
        assert_eq!(
            apply_improvement_notation(Some(0.25), ImprovementNotation::Decrease),
            Some(0.75)
        );
        assert_eq!(
            apply_improvement_notation(Some(0.25), ImprovementNotation::Increase),
            Some(0.25)
        );
        assert_eq!(apply_improvement_notation(Some(-1.0), ImprovementNotation::Increase), None);
        assert_eq!(apply_improvement_notation(None, ImprovementNotation::Decrease), None);
    }
}
