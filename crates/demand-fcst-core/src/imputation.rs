//! Missing value imputation for month gaps.

/// Replace every absent month with `fill_value`.
pub fn fill_gaps_with(values: &[Option<f64>], fill_value: f64) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(fill_value)).collect()
}

/// Fill absent months on the straight line between their observed neighbours.
///
/// Leading and trailing gaps take the nearest observed value. A series with
/// no observation at all yields NaN everywhere.
pub fn interpolate_gaps(values: &[Option<f64>]) -> Vec<f64> {
    if values.is_empty() {
        return vec![];
    }

    let mut result: Vec<f64> = vec![f64::NAN; values.len()];

    let (first, last) = match (
        values.iter().position(|v| v.is_some()),
        values.iter().rposition(|v| v.is_some()),
    ) {
        (Some(first), Some(last)) => (first, last),
        _ => return result,
    };

    let first_value = values[first].unwrap_or(f64::NAN);
    for slot in result.iter_mut().take(first) {
        *slot = first_value;
    }

    let mut prev_idx = first;
    let mut prev_value = first_value;
    result[first] = first_value;

    for i in (first + 1)..=last {
        if let Some(v) = values[i] {
            let gap = i - prev_idx;
            if gap > 1 {
                let step = (v - prev_value) / gap as f64;
                for (k, slot) in result.iter_mut().enumerate().take(i).skip(prev_idx + 1) {
                    *slot = prev_value + step * (k - prev_idx) as f64;
                }
            }
            result[i] = v;
            prev_idx = i;
            prev_value = v;
        }
    }

    let last_value = values[last].unwrap_or(f64::NAN);
    for slot in result.iter_mut().skip(last + 1) {
        *slot = last_value;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fill_gaps_with() {
        let values = vec![Some(1.0), None, Some(3.0)];
        assert_eq!(fill_gaps_with(&values, 0.0), vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn test_interpolate_gaps() {
        let values = vec![Some(1.0), None, None, Some(4.0)];
        let result = interpolate_gaps(&values);
        assert_relative_eq!(result[1], 2.0, epsilon = 1e-10);
        assert_relative_eq!(result[2], 3.0, epsilon = 1e-10);
        assert_relative_eq!(result[3], 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_interpolate_gaps_edges() {
        let values = vec![None, Some(2.0), None, Some(6.0), None];
        let result = interpolate_gaps(&values);
        assert_eq!(result, vec![2.0, 2.0, 4.0, 6.0, 6.0]);
    }

    #[test]
    fn test_interpolate_gaps_all_null() {
        let result = interpolate_gaps(&[None, None]);
        assert!(result.iter().all(|v| v.is_nan()));
        assert!(interpolate_gaps(&[]).is_empty());
    }
}
