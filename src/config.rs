//! Run configuration and parameter auto-correction.

use std::fmt;

use log::{debug, warn};

/// User-facing configuration of a geseca run.
///
/// Defaults: `sample_size = 101`, `eps = 1e-50`, `n_perm_simple = 1000`,
/// centered but unscaled rows.
#[derive(Debug, Clone, PartialEq)]
pub struct GesecaConfig {
    /// Minimal size of a gene set after intersecting with matrix rows.
    pub min_size: usize,
    /// Maximal size of a gene set; `None` means `n_genes - 1`.
    pub max_size: Option<usize>,
    /// Subtract the row mean before scoring.
    pub center: bool,
    /// Scale rows to unit variance before scoring.
    pub scale: bool,
    /// Population size of the multilevel splitting kernel. Forced odd and >= 3.
    pub sample_size: usize,
    /// Smallest reportable p-value; clamped to `[0, 1]`.
    pub eps: f64,
    /// Number of permutations for the simple estimate.
    pub n_perm_simple: usize,
    /// Worker threads; 0 uses the global rayon pool.
    pub nproc: usize,
    /// Run seed. Drawn from OS entropy when absent.
    pub seed: Option<u64>,
}

impl Default for GesecaConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: None,
            center: true,
            scale: false,
            sample_size: 101,
            eps: 1e-50,
            n_perm_simple: 1000,
            nproc: 0,
            seed: None,
        }
    }
}

/// Non-fatal conditions surfaced to the caller alongside the result table.
#[derive(Debug, Clone, PartialEq)]
pub enum GesecaWarning {
    /// The requested sample size was not odd or was below 3.
    SampleSizeAdjusted { requested: usize, used: usize },
    /// Some p-values hit the `eps` floor; their `log2err` is undefined.
    PvaluesFloored { count: usize, eps: f64 },
}

impl fmt::Display for GesecaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GesecaWarning::SampleSizeAdjusted { requested, used } => write!(
                f,
                "sample_size must be an odd number >= 3; using {} instead of {}",
                used, requested
            ),
            GesecaWarning::PvaluesFloored { count, eps } => write!(
                f,
                "for {} gene set(s) the p-value was estimated below eps = {:e}; \
                 p-values are reported as eps. Lower eps to resolve them",
                count, eps
            ),
        }
    }
}

/// Parameters after auto-correction, as used by the computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub min_size: usize,
    pub max_size: usize,
    pub sample_size: usize,
    pub eps: f64,
    pub n_perm_simple: usize,
}

impl GesecaConfig {
    /// Apply auto-corrections against a matrix with `n_genes` rows.
    ///
    /// Each correction is logged when it happens and also returned so the
    /// caller can surface it.
    pub fn resolve(&self, n_genes: usize) -> (ResolvedParams, Vec<GesecaWarning>) {
        let mut warnings = Vec::new();

        let sample_size = adjust_sample_size(self.sample_size);
        if sample_size != self.sample_size {
            let w = GesecaWarning::SampleSizeAdjusted {
                requested: self.sample_size,
                used: sample_size,
            };
            warn!("{}", w);
            warnings.push(w);
        }

        let eps = clamp_eps(self.eps);
        if eps != self.eps {
            debug!("eps {} clamped to {}", self.eps, eps);
        }

        let max_size = self
            .max_size
            .unwrap_or_else(|| n_genes.saturating_sub(1));

        let params = ResolvedParams {
            min_size: self.min_size.max(1),
            max_size,
            sample_size,
            eps,
            n_perm_simple: self.n_perm_simple,
        };
        (params, warnings)
    }
}

/// Force the kernel population size to be odd and at least 3.
pub fn adjust_sample_size(requested: usize) -> usize {
    if requested < 3 {
        3
    } else if requested % 2 == 0 {
        requested + 1
    } else {
        requested
    }
}

/// Clamp `eps` into `[0, 1]`. NaN becomes 0.
pub fn clamp_eps(eps: f64) -> f64 {
    if eps.is_nan() {
        0.0
    } else {
        eps.clamp(0.0, 1.0)
    }
}
