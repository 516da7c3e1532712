//! Small numeric helpers shared by the estimators

/// Scale factor turning a median absolute deviation into a sigma estimate
/// for normally distributed data.
pub const MAD_SCALE: f64 = 1.4826;

/// Near-equality in units in the last place
#[inline]
pub(crate) fn almost_equal(a: f64, b: f64) -> bool {
    approx::ulps_eq!(a, b, max_ulps = 5)
}

/// Whether `z` holds an integral value
#[inline]
pub(crate) fn is_integral(z: f64) -> bool {
    almost_equal(z.round(), z)
}

/// Median of an unsorted sample; NaN when empty
pub(crate) fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

/// `MAD_SCALE` times the unweighted median of `|z - center|`.
///
/// NaN for fewer than two values.
pub(crate) fn scaled_mad<I>(values: I, center: f64) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut deviations: Vec<f64> = values.into_iter().map(|z| (z - center).abs()).collect();
    if deviations.len() < 2 {
        return f64::NAN;
    }
    MAD_SCALE * median(&mut deviations)
}
