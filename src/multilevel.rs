//! Multilevel splitting estimate of small tail probabilities.
//!
//! A population of random gene sets is pushed towards high scores level by
//! level: the upper half survives, the lower half is replaced by copies of
//! surviving sets that take a random walk of gene swaps constrained to stay
//! above the current median. Each level multiplies the tail probability by the
//! surviving fraction, so probabilities of order `2^-k` need about `k` levels
//! instead of `2^k` permutations.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::matrix::ExpressionMatrix;
use crate::score::{profile_score, reaches};

/// High-resolution p-value estimator used for escalated gene sets.
///
/// Targets are score sums in the raw units of [`crate::score::raw_score`].
/// Returned p-values lie in `[0, 1]`; a value below `eps` means the estimate
/// reached the floor and is reported as `eps` by the caller.
pub trait SplittingKernel: Sync {
    fn refine(
        &self,
        matrix: &ExpressionMatrix,
        observed_score_sum: f64,
        size: usize,
        sample_size: usize,
        seed: u64,
        eps: f64,
    ) -> f64;

    /// Refine every target of one gene set size.
    fn refine_group(
        &self,
        matrix: &ExpressionMatrix,
        targets: &[f64],
        size: usize,
        sample_size: usize,
        seed: u64,
        eps: f64,
    ) -> Vec<f64> {
        targets
            .iter()
            .map(|&t| self.refine(matrix, t, size, sample_size, seed, eps))
            .collect()
    }
}

/// Levels recorded while pushing a population up the score distribution.
#[derive(Clone, Debug)]
pub struct TailCurve {
    pub thresholds: Vec<f64>,
    /// `log_probs[i]` is the log probability of exceeding `thresholds[i - 1]`.
    pub log_probs: Vec<f64>,
    /// Scores of the population at each level.
    pub populations: Vec<Vec<f64>>,
    pub sample_size: usize,
}

impl TailCurve {
    /// Probability that a random set of the curve's size scores `>= target`.
    pub fn pval(&self, target: f64) -> f64 {
        let level = self
            .thresholds
            .iter()
            .take_while(|&&t| target >= t)
            .count()
            .min(self.populations.len() - 1);

        let population = &self.populations[level];
        let better = population.iter().filter(|&&s| reaches(s, target)).count();
        let tail = better as f64 / population.len() as f64;
        (self.log_probs[level].exp() * tail).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug)]
struct Particle {
    /// Sorted row indices.
    genes: Vec<usize>,
    profile: Vec<f64>,
    score: f64,
}

impl Particle {
    fn random(matrix: &ExpressionMatrix, size: usize, rng: &mut ChaCha20Rng) -> Self {
        let mut genes = rand::seq::index::sample(rng, matrix.n_genes(), size).into_vec();
        genes.sort_unstable();
        let mut profile = vec![0.0; matrix.n_samples()];
        for &g in &genes {
            matrix.accumulate(&mut profile, g, 1.0);
        }
        let score = profile_score(&profile);
        Self {
            genes,
            profile,
            score,
        }
    }

    /// Rebuild profile and score from `genes`, dropping accumulated rounding.
    fn refresh(&mut self, matrix: &ExpressionMatrix) {
        self.profile.fill(0.0);
        for &g in &self.genes {
            matrix.accumulate(&mut self.profile, g, 1.0);
        }
        self.score = profile_score(&self.profile);
    }

    /// A walked copy of `self` with a freshly summed profile.
    fn offspring(
        &self,
        matrix: &ExpressionMatrix,
        threshold: f64,
        steps: usize,
        rng: &mut ChaCha20Rng,
    ) -> Self {
        let mut child = self.clone();
        child.walk(matrix, threshold, steps, rng);
        child.refresh(matrix);
        child
    }

    fn swapped_score(&self, matrix: &ExpressionMatrix, remove: usize, add: usize) -> f64 {
        let denom = (self.profile.len() - 1) as f64;
        self.profile
            .iter()
            .zip(matrix.row(remove))
            .zip(matrix.row(add))
            .map(|((p, r), a)| {
                let x = p - r + a;
                x * x
            })
            .sum::<f64>()
            / denom
    }

    /// Random gene swaps, each kept only if the score stays `>= threshold`.
    fn walk(&mut self, matrix: &ExpressionMatrix, threshold: f64, steps: usize, rng: &mut ChaCha20Rng) {
        let n_genes = matrix.n_genes();
        for _ in 0..steps {
            let out_pos = rng.gen_range(0..self.genes.len());
            let remove = self.genes[out_pos];

            let mut add = rng.gen_range(0..n_genes);
            let mut attempts = 0;
            while self.genes.binary_search(&add).is_ok() && attempts < 10 {
                add = rng.gen_range(0..n_genes);
                attempts += 1;
            }
            if attempts >= 10 {
                continue;
            }

            let candidate = self.swapped_score(matrix, remove, add);
            if candidate >= threshold {
                self.genes.remove(out_pos);
                let pos = self.genes.binary_search(&add).unwrap_or_else(|e| e);
                self.genes.insert(pos, add);
                matrix.accumulate(&mut self.profile, remove, -1.0);
                matrix.accumulate(&mut self.profile, add, 1.0);
                self.score = candidate;
            }
        }
    }
}

/// Default kernel for the gene set variance score.
#[derive(Debug, Clone, Copy)]
pub struct MultilevelSplitting {
    pub max_levels: usize,
}

impl Default for MultilevelSplitting {
    fn default() -> Self {
        Self { max_levels: 2000 }
    }
}

impl MultilevelSplitting {
    /// Build the tail curve for `size` until `target` or the `eps` floor is reached.
    pub fn build_tail_curve(
        &self,
        matrix: &ExpressionMatrix,
        size: usize,
        sample_size: usize,
        seed: u64,
        eps: f64,
        target: f64,
    ) -> TailCurve {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let walk_steps = size.clamp(10, 100);
        let cutoff = sample_size / 2;

        let mut population: Vec<Particle> = (0..sample_size)
            .map(|_| Particle::random(matrix, size, &mut rng))
            .collect();

        let mut thresholds = Vec::new();
        let mut log_probs = vec![0.0];
        let mut populations = vec![scores(&population)];
        let mut log_prob: f64 = 0.0;

        for _ in 0..self.max_levels {
            if log_prob.exp() < eps {
                break;
            }

            let mut order: Vec<usize> = (0..sample_size).collect();
            order.select_nth_unstable_by(cutoff, |&i, &j| {
                population[j].score.total_cmp(&population[i].score)
            });
            let threshold = population[order[cutoff]].score;
            if threshold >= target {
                break;
            }

            let survivors: Vec<usize> = (0..sample_size)
                .filter(|&i| population[i].score >= threshold)
                .collect();
            // Ties at the median: the level would not move.
            if survivors.len() == sample_size {
                break;
            }

            thresholds.push(threshold);
            log_prob += (survivors.len() as f64 / sample_size as f64).ln();
            log_probs.push(log_prob);

            let elites: Vec<usize> = if survivors.len() > cutoff {
                rand::seq::index::sample(&mut rng, survivors.len(), cutoff)
                    .into_iter()
                    .map(|i| survivors[i])
                    .collect()
            } else {
                survivors
            };

            let mut next = Vec::with_capacity(sample_size);
            for &i in &elites {
                next.push(population[i].clone());
            }
            while next.len() < sample_size {
                let parent = elites[rng.gen_range(0..elites.len())];
                next.push(population[parent].offspring(matrix, threshold, walk_steps, &mut rng));
            }
            population = next;
            populations.push(scores(&population));
        }

        TailCurve {
            thresholds,
            log_probs,
            populations,
            sample_size,
        }
    }
}

fn scores(population: &[Particle]) -> Vec<f64> {
    population.iter().map(|p| p.score).collect()
}

impl SplittingKernel for MultilevelSplitting {
    fn refine(
        &self,
        matrix: &ExpressionMatrix,
        observed_score_sum: f64,
        size: usize,
        sample_size: usize,
        seed: u64,
        eps: f64,
    ) -> f64 {
        self.build_tail_curve(matrix, size, sample_size, seed, eps, observed_score_sum)
            .pval(observed_score_sum)
    }

    /// One curve up to the largest target serves the whole group.
    fn refine_group(
        &self,
        matrix: &ExpressionMatrix,
        targets: &[f64],
        size: usize,
        sample_size: usize,
        seed: u64,
        eps: f64,
    ) -> Vec<f64> {
        let Some(max_target) = targets.iter().copied().reduce(f64::max) else {
            return Vec::new();
        };
        let curve = self.build_tail_curve(matrix, size, sample_size, seed, eps, max_target);
        targets.iter().map(|&t| curve.pval(t)).collect()
    }
}
