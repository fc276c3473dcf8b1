use num_traits::Float;

/// Median of the non-NaN samples, or `None` if there are none.
pub fn nan_median<T: Float>(data: &[T]) -> Option<T> {
    let mut finite: Vec<T> = data.iter().copied().filter(|x| !x.is_nan()).collect();
    if finite.is_empty() {
        return None;
    }
    // NaNs are gone, so partial_cmp is total here.
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 1 {
        Some(finite[mid])
    } else {
        let two = T::one() + T::one();
        Some((finite[mid - 1] + finite[mid]) / two)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_and_even_lengths() {
        assert_eq!(nan_median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(nan_median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn ignores_nan() {
        assert_eq!(nan_median(&[f64::NAN, 5.0, 1.0, f64::NAN, 3.0]), Some(3.0));
        assert_eq!(nan_median::<f32>(&[f32::NAN]), None);
        assert_eq!(nan_median::<f64>(&[]), None);
    }
}
