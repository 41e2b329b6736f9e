//! Simple permutation estimate.
//!
//! Every permutation draws one random ordered gene subset of the largest size
//! needed and reads off the score of each prefix, so a single draw serves all
//! gene set sizes at once.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::error::{GesecaError, Result};
use crate::matrix::ExpressionMatrix;
use crate::pathways::IndexedGeneSet;
use crate::score::{profile_score, raw_score, reaches};

/// Observed score of a gene set and how many random sets of the same size
/// scored at least as high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermutationCount {
    pub score: f64,
    pub n_more_extreme: usize,
}

/// Source of the simple permutation estimate.
pub trait PermutationEngine: Sync {
    fn count(
        &self,
        matrix: &ExpressionMatrix,
        gene_sets: &[IndexedGeneSet],
        n_perm: usize,
        seed: u64,
    ) -> Result<Vec<PermutationCount>>;
}

/// Default engine: random gene subsets, evaluated in parallel chunks.
#[derive(Debug, Clone, Copy)]
pub struct SimplePermutation {
    /// Permutations per RNG stream. Results depend on it, thread count does not.
    pub chunk_size: usize,
}

impl Default for SimplePermutation {
    fn default() -> Self {
        Self { chunk_size: 256 }
    }
}

impl PermutationEngine for SimplePermutation {
    fn count(
        &self,
        matrix: &ExpressionMatrix,
        gene_sets: &[IndexedGeneSet],
        n_perm: usize,
        seed: u64,
    ) -> Result<Vec<PermutationCount>> {
        let n_sets = gene_sets.len();
        let Some(max_size) = gene_sets.iter().map(IndexedGeneSet::size).max() else {
            return Ok(Vec::new());
        };
        if max_size > matrix.n_genes() {
            return Err(GesecaError::InvalidInput(format!(
                "gene set of size {} exceeds the {} matrix rows",
                max_size,
                matrix.n_genes()
            )));
        }

        let observed: Vec<f64> = gene_sets
            .par_iter()
            .map(|s| raw_score(matrix, &s.rows))
            .collect();

        let mut by_size: Vec<Vec<usize>> = vec![Vec::new(); max_size + 1];
        for (i, s) in gene_sets.iter().enumerate() {
            by_size[s.size()].push(i);
        }

        let chunk_size = self.chunk_size.max(1);
        let n_chunks = n_perm.div_ceil(chunk_size);
        let n_genes = matrix.n_genes();

        let counts = (0..n_chunks)
            .into_par_iter()
            .map(|chunk| {
                let start = chunk * chunk_size;
                let len = chunk_size.min(n_perm - start);
                let mut rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(chunk as u64));
                let mut counts = vec![0usize; n_sets];
                let mut profile = vec![0.0; matrix.n_samples()];

                for _ in 0..len {
                    profile.fill(0.0);
                    let picked = rand::seq::index::sample(&mut rng, n_genes, max_size);
                    for (k, gene) in picked.iter().enumerate() {
                        matrix.accumulate(&mut profile, gene, 1.0);
                        let members = &by_size[k + 1];
                        if members.is_empty() {
                            continue;
                        }
                        let random_score = profile_score(&profile);
                        for &m in members {
                            if reaches(random_score, observed[m]) {
                                counts[m] += 1;
                            }
                        }
                    }
                }
                counts
            })
            .reduce(
                || vec![0usize; n_sets],
                |mut acc, part| {
                    for (a, p) in acc.iter_mut().zip(part) {
                        *a += p;
                    }
                    acc
                },
            );

        Ok(observed
            .into_iter()
            .zip(counts)
            .map(|(score, n_more_extreme)| PermutationCount {
                score,
                n_more_extreme,
            })
            .collect())
    }
}
