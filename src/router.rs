//! Escalation routing: keep the permutation estimate or refine it.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::estimate::{estimate_errors, ErrorBounds};

/// Per-gene-set output of the simple permutation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneSetStat {
    pub name: String,
    pub pct_var: f64,
    pub size: usize,
    pub n_more_extreme: usize,
}

impl GeneSetStat {
    /// Smoothed permutation p-value `(n + 1) / (N + 1)`.
    pub fn simple_pval(&self, n_perm: usize) -> f64 {
        (self.n_more_extreme as f64 + 1.0) / (n_perm as f64 + 1.0)
    }
}

/// A gene set whose permutation estimate is precise enough.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRow {
    pub stat: GeneSetStat,
    pub pval: f64,
    pub bounds: ErrorBounds,
}

/// A gene set handed to the splitting kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalatedRow {
    pub stat: GeneSetStat,
    pub bounds: ErrorBounds,
}

/// An escalated gene set after refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedRow {
    pub stat: GeneSetStat,
    pub pval: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Accepted(AcceptedRow),
    Escalated(EscalatedRow),
}

/// Both branches of a routed run. Every input row lands in exactly one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub accepted: Vec<AcceptedRow>,
    pub escalated: Vec<EscalatedRow>,
}

/// Decide the branch of a single gene set.
pub fn classify(stat: GeneSetStat, n_perm: usize, sample_size: usize) -> Result<Routed> {
    let bounds = estimate_errors(stat.n_more_extreme, n_perm, sample_size)?;
    Ok(if bounds.accepts_simple() {
        let pval = stat.simple_pval(n_perm);
        Routed::Accepted(AcceptedRow { stat, pval, bounds })
    } else {
        Routed::Escalated(EscalatedRow { stat, bounds })
    })
}

/// Route every gene set.
pub fn route(stats: Vec<GeneSetStat>, n_perm: usize, sample_size: usize) -> Result<Partition> {
    let mut partition = Partition::default();
    for stat in stats {
        match classify(stat, n_perm, sample_size)? {
            Routed::Accepted(row) => partition.accepted.push(row),
            Routed::Escalated(row) => partition.escalated.push(row),
        }
    }
    Ok(partition)
}

/// Accept every gene set regardless of its bounds.
pub fn accept_all(stats: Vec<GeneSetStat>, n_perm: usize, sample_size: usize) -> Result<Partition> {
    let accepted = stats
        .into_iter()
        .map(|stat| {
            let bounds = estimate_errors(stat.n_more_extreme, n_perm, sample_size)?;
            let pval = stat.simple_pval(n_perm);
            Ok(AcceptedRow { stat, pval, bounds })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Partition {
        accepted,
        escalated: Vec::new(),
    })
}

/// Group escalated rows by gene set size.
pub fn group_by_size(escalated: Vec<EscalatedRow>) -> BTreeMap<usize, Vec<EscalatedRow>> {
    let mut groups: BTreeMap<usize, Vec<EscalatedRow>> = BTreeMap::new();
    for row in escalated {
        groups.entry(row.stat.size).or_default().push(row);
    }
    groups
}
