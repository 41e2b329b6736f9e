//! Expression matrix storage and row preprocessing.
//!
//! Rows are genes, columns are samples. Values are stored row-major so that a
//! gene's profile is a contiguous slice, which is what the score reducer and
//! both samplers add and subtract.

use std::collections::{HashMap, HashSet};

use crate::error::{GesecaError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    genes: Vec<String>,
    n_samples: usize,
    values: Vec<f64>,
}

impl ExpressionMatrix {
    /// Build a matrix from row-major `values`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape is inconsistent, fewer than two samples
    /// are given, a value is not finite, or a gene identifier is repeated.
    pub fn new(genes: Vec<String>, n_samples: usize, values: Vec<f64>) -> Result<Self> {
        if n_samples < 2 {
            return Err(GesecaError::InvalidInput(format!(
                "expression matrix needs at least 2 samples, got {}",
                n_samples
            )));
        }
        if values.len() != genes.len() * n_samples {
            return Err(GesecaError::InvalidInput(format!(
                "expected {} x {} = {} values, got {}",
                genes.len(),
                n_samples,
                genes.len() * n_samples,
                values.len()
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(GesecaError::InvalidInput(format!(
                "non-finite value for gene '{}'",
                genes[pos / n_samples]
            )));
        }
        let mut seen = HashSet::with_capacity(genes.len());
        for g in &genes {
            if !seen.insert(g.as_str()) {
                return Err(GesecaError::InvalidInput(format!(
                    "duplicate gene identifier '{}'",
                    g
                )));
            }
        }
        Ok(Self {
            genes,
            n_samples,
            values,
        })
    }

    /// Build a matrix from one `Vec` per gene.
    pub fn from_rows(genes: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_samples = rows.first().map_or(0, |r| r.len());
        if let Some(i) = rows.iter().position(|r| r.len() != n_samples) {
            return Err(GesecaError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                i,
                rows[i].len(),
                n_samples
            )));
        }
        if rows.len() != genes.len() {
            return Err(GesecaError::InvalidInput(format!(
                "{} gene identifiers for {} rows",
                genes.len(),
                rows.len()
            )));
        }
        Self::new(genes, n_samples, rows.into_iter().flatten().collect())
    }

    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_samples..(i + 1) * self.n_samples]
    }

    /// Lookup table from gene identifier to row index.
    pub fn gene_index(&self) -> HashMap<&str, usize> {
        self.genes
            .iter()
            .enumerate()
            .map(|(i, g)| (g.as_str(), i))
            .collect()
    }

    /// Return a copy with rows centered and/or scaled to unit variance.
    ///
    /// # Errors
    ///
    /// [`GesecaError::ZeroVarianceRow`] if `scale` is set and a row is constant.
    pub fn preprocess(&self, center: bool, scale: bool) -> Result<Self> {
        let n = self.n_samples;
        let mut values = Vec::with_capacity(self.values.len());
        for (i, gene) in self.genes.iter().enumerate() {
            let row = self.row(i);
            let mean = row.iter().sum::<f64>() / n as f64;
            let shift = if center { mean } else { 0.0 };
            let divisor = if scale {
                // Constancy is judged on the raw values, whatever `center` is.
                if row.iter().all(|v| *v == row[0]) {
                    return Err(GesecaError::ZeroVarianceRow { gene: gene.clone() });
                }
                // Uncentered rows are divided by their root mean square,
                // not their standard deviation.
                let ss: f64 = row.iter().map(|v| (v - shift).powi(2)).sum();
                (ss / (n - 1) as f64).sqrt()
            } else {
                1.0
            };
            values.extend(row.iter().map(|v| (v - shift) / divisor));
        }
        Ok(Self {
            genes: self.genes.clone(),
            n_samples: n,
            values,
        })
    }

    /// Sum of per-row sample variances.
    pub fn total_variance(&self) -> f64 {
        (0..self.n_genes()).map(|i| row_variance(self.row(i))).sum()
    }

    /// Add (`sign = 1.0`) or subtract (`sign = -1.0`) row `i` into `profile`.
    #[inline]
    pub fn accumulate(&self, profile: &mut [f64], i: usize, sign: f64) {
        for (acc, v) in profile.iter_mut().zip(self.row(i)) {
            *acc += sign * v;
        }
    }
}

fn row_variance(row: &[f64]) -> f64 {
    let n = row.len() as f64;
    let mean = row.iter().sum::<f64>() / n;
    row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
}
