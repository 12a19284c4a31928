/// Centered moving average with shrinking edges.
///
/// Near the ends of the recording the window is truncated to the samples that
/// exist, so the first and last values are never pulled towards zero.
pub fn centered_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window.max(1) / 2;
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        let start = i.saturating_sub(half);
        let end = if i + half < values.len() { i + half } else { values.len() - 1 };

        let sum: f64 = values[start..=end].iter().sum();
        let count = end - start + 1;
        result.push(sum / count as f64);
    }

    result
}
