//! Error bounds for the simple permutation estimate.
//!
//! Two bounds are compared per gene set, both on the log2 scale:
//!
//! - **simple error**: half-width of the Clopper–Pearson interval around the
//!   smoothed permutation estimate `(n + 1) / (N + 1)`;
//! - **multilevel error**: the asymptotic standard error the splitting kernel
//!   would reach for the same nominal p-value and population size.
//!
//! A third quantity, [`simple_log2err`], is the exact standard deviation of the
//! log of a `Beta(n + 1, N − n)` variate and is what the result table reports.

use std::f64::consts::LN_2;

use statrs::distribution::{Beta, ContinuousCDF};

use crate::error::{GesecaError, Result};

/// One-sided significance level of the Clopper–Pearson interval.
pub const CP_ALPHA: f64 = 0.025;

/// Both error bounds of one gene set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorBounds {
    pub simple: f64,
    pub multilevel: f64,
}

impl ErrorBounds {
    /// The simple estimate is kept when the kernel could not do better.
    #[inline]
    pub fn accepts_simple(&self) -> bool {
        self.multilevel >= self.simple
    }
}

/// Trigamma function ψ₁(x) for `x > 0`.
///
/// Shifts the argument above 6 with the recurrence
/// `ψ₁(x) = ψ₁(x + 1) + 1/x²` and finishes with the asymptotic series.
pub fn trigamma(x: f64) -> f64 {
    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let inv = 1.0 / x;
    let inv2 = inv * inv;
    acc + inv
        + inv2 / 2.0
        + inv * inv2 * (1.0 / 6.0 - inv2 * (1.0 / 30.0 - inv2 * (1.0 / 42.0 - inv2 / 30.0)))
}

/// Laplace-smoothed log2 p-value `log2((n + 1) / (N + 1))`.
#[inline]
pub fn rough_estimator(n_more_extreme: usize, n_perm: usize) -> f64 {
    ((n_more_extreme as f64 + 1.0) / (n_perm as f64 + 1.0)).log2()
}

/// Clopper–Pearson half-width on the log2 scale, taking the wider side.
///
/// Infinite when `n_more_extreme = 0`: the lower border is then zero and no
/// number of permutations bounds the estimate from below.
pub fn simple_error(n_more_extreme: usize, n_perm: usize) -> Result<f64> {
    let n = n_more_extreme as f64;
    let total = n_perm as f64;
    let rough = rough_estimator(n_more_extreme, n_perm);

    let left = if n_more_extreme == 0 {
        f64::NEG_INFINITY
    } else {
        beta_quantile(n, total - n + 1.0, CP_ALPHA)?.log2()
    };
    let right = if n_more_extreme >= n_perm {
        0.0
    } else {
        beta_quantile(n + 1.0, total - n, 1.0 - CP_ALPHA)?.log2()
    };

    Ok(0.5 * f64::max(rough - left, right - rough))
}

fn beta_quantile(a: f64, b: f64, p: f64) -> Result<f64> {
    let beta = Beta::new(a, b)
        .map_err(|e| GesecaError::Numeric(format!("Beta({}, {}): {}", a, b, e)))?;
    Ok(beta.inverse_cdf(p))
}

/// Asymptotic log2 standard error of the splitting kernel for a p-value
/// `pval` and population `sample_size`.
///
/// Each level halves the probability, so about `⌊−log2 p + 1⌋` levels are
/// needed, each contributing the variance of the log of a median order
/// statistic.
pub fn multilevel_error(pval: f64, sample_size: usize) -> f64 {
    let s = sample_size as f64;
    let levels = (-pval.log2() + 1.0).floor();
    let per_level = trigamma((s + 1.0) / 2.0) - trigamma(s + 1.0);
    (levels * per_level).sqrt() / LN_2
}

/// Compute both bounds for one gene set.
pub fn estimate_errors(
    n_more_extreme: usize,
    n_perm: usize,
    sample_size: usize,
) -> Result<ErrorBounds> {
    let pval = (n_more_extreme as f64 + 1.0) / (n_perm as f64 + 1.0);
    Ok(ErrorBounds {
        simple: simple_error(n_more_extreme, n_perm)?,
        multilevel: multilevel_error(pval, sample_size),
    })
}

/// Reported log2 standard error of the simple estimate:
/// `sqrt(ψ₁(n + 1) − ψ₁(N + 1)) / ln 2`.
pub fn simple_log2err(n_more_extreme: usize, n_perm: usize) -> f64 {
    let var = trigamma(n_more_extreme as f64 + 1.0) - trigamma(n_perm as f64 + 1.0);
    var.max(0.0).sqrt() / LN_2
}
