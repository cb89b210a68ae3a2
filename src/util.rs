/// Largest value, or 0 for an empty slice. Force readings are never negative
/// so 0 doubles as "nothing recorded".
pub fn max_or_zero(data: &[f64]) -> f64 {
    data.iter().copied().fold(0.0, f64::max)
}
