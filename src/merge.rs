//! Merging both branches into the final result table.

use crate::correction::benjamini_hochberg;
use crate::error::Result;
use crate::estimate::simple_log2err;
use crate::router::{AcceptedRow, GeneSetStat, RefinedRow};

/// Column names of the result table, in output order.
pub const COLUMNS: [&str; 6] = ["pathway", "pctVar", "pval", "padj", "log2err", "size"];

/// One row of the result table.
#[derive(Debug, Clone, PartialEq)]
pub struct GesecaRow {
    pub pathway: String,
    pub pct_var: f64,
    pub pval: f64,
    pub padj: f64,
    /// `None` when `pval` was floored at `eps`.
    pub log2err: Option<f64>,
    pub size: usize,
}

/// Result table ordered by ascending pathway name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GesecaTable {
    pub rows: Vec<GesecaRow>,
}

impl GesecaTable {
    pub fn columns(&self) -> &'static [&'static str] {
        &COLUMNS
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, pathway: &str) -> Option<&GesecaRow> {
        self.rows
            .binary_search_by(|r| r.pathway.as_str().cmp(pathway))
            .ok()
            .map(|i| &self.rows[i])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub table: GesecaTable,
    /// Rows whose p-value was floored at `eps`.
    pub n_floored: usize,
}

/// Combine accepted and refined rows, floor at `eps`, adjust and sort.
///
/// `log2err` describes the permutation estimate for both branches. The
/// Benjamini–Hochberg step runs once over all rows.
pub fn merge(
    accepted: Vec<AcceptedRow>,
    refined: Vec<RefinedRow>,
    n_perm: usize,
    eps: f64,
) -> Result<MergeOutcome> {
    let candidates = accepted
        .into_iter()
        .map(|r| (r.stat, r.pval))
        .chain(refined.into_iter().map(|r| (r.stat, r.pval.clamp(0.0, 1.0))));

    let mut n_floored = 0;
    let mut rows: Vec<GesecaRow> = candidates
        .map(|(stat, pval)| {
            let GeneSetStat {
                name,
                pct_var,
                size,
                n_more_extreme,
            } = stat;
            let (pval, log2err) = if pval < eps {
                n_floored += 1;
                (eps, None)
            } else {
                (pval, Some(simple_log2err(n_more_extreme, n_perm)))
            };
            GesecaRow {
                pathway: name,
                pct_var,
                pval,
                padj: f64::NAN,
                log2err,
                size,
            }
        })
        .collect();

    let pvals: Vec<f64> = rows.iter().map(|r| r.pval).collect();
    let padj = benjamini_hochberg(&pvals)?;
    for (row, adj) in rows.iter_mut().zip(padj) {
        row.padj = adj;
    }

    rows.sort_by(|a, b| a.pathway.cmp(&b.pathway));
    Ok(MergeOutcome {
        table: GesecaTable { rows },
        n_floored,
    })
}
