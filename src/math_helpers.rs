//! Arithmetic helpers that return defaults instead of failing on
//! division-by-zero or empty input

use std::ops::Div;

/// Divides `numerator` by `denominator`, returning the numeric type's zero
/// when the denominator is zero instead of panicking or producing infinity.
///
/// Works for any numeric type whose `Default` is its additive identity, which
/// holds for all primitive integers and floats.
pub fn safe_div<T>(numerator: T, denominator: T) -> T
where
    T: Copy + PartialEq + Div<Output = T> + Default,
{
    if denominator == T::default() {
        T::default()
    } else {
        numerator / denominator
    }
}

/// Arithmetic mean of `values`, or `0.0` when the slice is empty.
pub fn safe_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let total: f64 = values.iter().sum();
    total / values.len() as f64
}
