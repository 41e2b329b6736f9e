//! Benjamini–Hochberg false discovery rate adjustment.

use crate::error::{GesecaError, Result};

/// Benjamini–Hochberg step-up adjustment.
///
/// Adjusted values are returned in input order. Ranks are taken over the
/// ascending p-values, `p · n / rank` is capped at 1, and a running minimum
/// from the largest p-value down enforces monotonicity.
pub fn benjamini_hochberg(p_values: &[f64]) -> Result<Vec<f64>> {
    if let Some((i, p)) = p_values
        .iter()
        .enumerate()
        .find(|(_, p)| !(0.0..=1.0).contains(*p))
    {
        return Err(GesecaError::InvalidInput(format!(
            "p-value at index {} is out of range [0, 1]: {}",
            i, p
        )));
    }

    let n = p_values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; n];
    let mut running = 1.0f64;
    for (rank0, &idx) in order.iter().enumerate().rev() {
        let rank = (rank0 + 1) as f64;
        running = running.min(p_values[idx] * n as f64 / rank);
        adjusted[idx] = running;
    }
    Ok(adjusted)
}
