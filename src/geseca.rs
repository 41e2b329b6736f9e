//! Run orchestration: permutation estimate, routing, refinement, merge.

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

use crate::config::{GesecaConfig, GesecaWarning, ResolvedParams};
use crate::error::{GesecaError, Result};
use crate::matrix::ExpressionMatrix;
use crate::merge::{merge, GesecaTable};
use crate::multilevel::{MultilevelSplitting, SplittingKernel};
use crate::pathways::{filter_gene_sets, GeneSets, IndexedGeneSet};
use crate::router::{accept_all, group_by_size, route, EscalatedRow, GeneSetStat, RefinedRow};
use crate::score::{checked_total_variance, pct_var, score_sum};
use crate::simple::{PermutationEngine, SimplePermutation};

/// Result table plus the non-fatal conditions raised while computing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GesecaOutput {
    pub table: GesecaTable,
    pub warnings: Vec<GesecaWarning>,
}

/// Hybrid run with the default permutation engine and splitting kernel.
pub fn geseca(
    matrix: &ExpressionMatrix,
    gene_sets: &GeneSets,
    config: &GesecaConfig,
) -> Result<GesecaOutput> {
    geseca_with(
        matrix,
        gene_sets,
        config,
        &SimplePermutation::default(),
        &MultilevelSplitting::default(),
    )
}

/// Permutation-only run: every gene set keeps its simple estimate.
pub fn geseca_simple(
    matrix: &ExpressionMatrix,
    gene_sets: &GeneSets,
    config: &GesecaConfig,
) -> Result<GesecaOutput> {
    run(matrix, gene_sets, config, &SimplePermutation::default(), None)
}

/// Hybrid run with caller-supplied collaborators.
pub fn geseca_with<E, K>(
    matrix: &ExpressionMatrix,
    gene_sets: &GeneSets,
    config: &GesecaConfig,
    engine: &E,
    kernel: &K,
) -> Result<GesecaOutput>
where
    E: PermutationEngine,
    K: SplittingKernel,
{
    run(matrix, gene_sets, config, engine, Some(kernel as &dyn SplittingKernel))
}

fn run(
    matrix: &ExpressionMatrix,
    gene_sets: &GeneSets,
    config: &GesecaConfig,
    engine: &dyn PermutationEngine,
    kernel: Option<&dyn SplittingKernel>,
) -> Result<GesecaOutput> {
    if config.n_perm_simple == 0 {
        return Err(GesecaError::InvalidInput(
            "n_perm_simple must be > 0".to_string(),
        ));
    }
    let prepared = matrix.preprocess(config.center, config.scale)?;
    let (params, mut warnings) = config.resolve(prepared.n_genes());

    let sets = filter_gene_sets(&prepared, gene_sets, params.min_size, params.max_size);
    info!(
        "{} of {} gene sets have size in [{}, {}]",
        sets.len(),
        gene_sets.len(),
        params.min_size,
        params.max_size
    );
    if sets.is_empty() {
        return Ok(GesecaOutput {
            table: GesecaTable::default(),
            warnings,
        });
    }
    let total_variance = checked_total_variance(&prepared)?;

    let run_seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let mut seeder = ChaCha20Rng::seed_from_u64(run_seed);
    let perm_seed: u64 = seeder.gen();
    let kernel_seed: u64 = seeder.gen();
    debug!("run seed {}", run_seed);

    let outcome = in_pool(config.nproc, || {
        let stats = simple_stats(&prepared, &sets, engine, &params, total_variance, perm_seed)?;
        let n_perm = params.n_perm_simple;

        let partition = match kernel {
            Some(_) => route(stats, n_perm, params.sample_size)?,
            None => accept_all(stats, n_perm, params.sample_size)?,
        };
        info!(
            "{} gene sets kept the permutation estimate, {} escalated",
            partition.accepted.len(),
            partition.escalated.len()
        );

        let refined = match kernel {
            Some(kernel) if !partition.escalated.is_empty() => refine_escalated(
                &prepared,
                partition.escalated,
                kernel,
                &params,
                total_variance,
                kernel_seed,
                &mut seeder,
            )?,
            _ => Vec::new(),
        };

        merge(partition.accepted, refined, n_perm, params.eps)
    })??;

    if outcome.n_floored > 0 {
        let w = GesecaWarning::PvaluesFloored {
            count: outcome.n_floored,
            eps: params.eps,
        };
        warn!("{}", w);
        warnings.push(w);
    }

    Ok(GesecaOutput {
        table: outcome.table,
        warnings,
    })
}

fn simple_stats(
    matrix: &ExpressionMatrix,
    sets: &[IndexedGeneSet],
    engine: &dyn PermutationEngine,
    params: &ResolvedParams,
    total_variance: f64,
    seed: u64,
) -> Result<Vec<GeneSetStat>> {
    let n_perm = params.n_perm_simple;
    let counts = engine.count(matrix, sets, n_perm, seed)?;
    if counts.len() != sets.len() {
        return Err(GesecaError::InvalidInput(format!(
            "permutation engine returned {} counts for {} gene sets",
            counts.len(),
            sets.len()
        )));
    }
    Ok(sets
        .iter()
        .zip(counts)
        .map(|(set, count)| GeneSetStat {
            name: set.name.clone(),
            pct_var: pct_var(count.score, set.size(), total_variance),
            size: set.size(),
            n_more_extreme: count.n_more_extreme.min(n_perm),
        })
        .collect())
}

/// Dispatch escalated rows to the kernel, one call per size group.
///
/// Groups are shuffled to spread large sizes across workers; the merge
/// re-sorts by name so the order never reaches the output.
fn refine_escalated(
    matrix: &ExpressionMatrix,
    escalated: Vec<EscalatedRow>,
    kernel: &dyn SplittingKernel,
    params: &ResolvedParams,
    total_variance: f64,
    seed: u64,
    rng: &mut ChaCha20Rng,
) -> Result<Vec<RefinedRow>> {
    let mut groups: Vec<(usize, Vec<EscalatedRow>)> = group_by_size(escalated).into_iter().collect();
    groups.shuffle(rng);
    info!("refining p-values for {} gene set sizes", groups.len());

    let refined = groups
        .into_par_iter()
        .map(|(size, rows)| {
            let targets: Vec<f64> = rows
                .iter()
                .map(|r| score_sum(r.stat.pct_var, size, total_variance))
                .collect();
            debug!("size {}: {} gene sets", size, rows.len());
            let pvals = kernel.refine_group(
                matrix,
                &targets,
                size,
                params.sample_size,
                seed,
                params.eps,
            );
            if pvals.len() != rows.len() {
                return Err(GesecaError::InvalidInput(format!(
                    "splitting kernel returned {} p-values for {} gene sets of size {}",
                    pvals.len(),
                    rows.len(),
                    size
                )));
            }
            Ok(rows
                .into_iter()
                .zip(pvals)
                .map(|(row, pval)| RefinedRow {
                    stat: row.stat,
                    pval,
                })
                .collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(refined.into_iter().flatten().collect())
}

/// Run `op` on a dedicated pool of `nproc` threads, or on the global pool.
fn in_pool<R, F>(nproc: usize, op: F) -> Result<R>
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    if nproc == 0 {
        return Ok(op());
    }
    let pool = rayon::ThreadPoolBuilder::new().num_threads(nproc).build()?;
    Ok(pool.install(op))
}
