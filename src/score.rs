//! Gene set score: variance of the summed expression profile.
//!
//! For a gene set `S` the profile is `x_j = Σ_{i∈S} E_ij` and the raw score is
//! `Σ_j x_j² / (n_samples − 1)`. Dividing by `size · total_variance` turns it
//! into the percentage of matrix variance explained by the set.

use crate::error::{GesecaError, Result};
use crate::matrix::ExpressionMatrix;

/// Raw score from an accumulated profile.
#[inline]
pub fn profile_score(profile: &[f64]) -> f64 {
    let denom = (profile.len() - 1) as f64;
    profile.iter().map(|x| x * x).sum::<f64>() / denom
}

/// Relative slack when comparing scores summed in different gene orders.
pub const SCORE_RTOL: f64 = 1e-12;

/// `score >= target`, treating scores equal up to rounding as ties.
#[inline]
pub fn reaches(score: f64, target: f64) -> bool {
    score >= target - SCORE_RTOL * target.abs()
}

/// Raw score of the gene set made of `rows`.
pub fn raw_score(matrix: &ExpressionMatrix, rows: &[usize]) -> f64 {
    let mut profile = vec![0.0; matrix.n_samples()];
    for &r in rows {
        matrix.accumulate(&mut profile, r, 1.0);
    }
    profile_score(&profile)
}

/// Percentage of total variance explained.
#[inline]
pub fn pct_var(raw: f64, size: usize, total_variance: f64) -> f64 {
    100.0 * raw / (size as f64 * total_variance)
}

/// Inverse of [`pct_var`]: the score sum the splitting kernel compares against.
#[inline]
pub fn score_sum(pct_var: f64, size: usize, total_variance: f64) -> f64 {
    pct_var * size as f64 * total_variance / 100.0
}

/// Total variance of a preprocessed matrix, rejecting degenerate matrices.
pub fn checked_total_variance(matrix: &ExpressionMatrix) -> Result<f64> {
    let total = matrix.total_variance();
    if total > 0.0 && total.is_finite() {
        Ok(total)
    } else {
        Err(GesecaError::InvalidInput(format!(
            "expression matrix has no usable variance (total variance = {})",
            total
        )))
    }
}
