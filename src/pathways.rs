//! Gene set filtering against matrix rows.

use std::collections::BTreeMap;

use crate::matrix::ExpressionMatrix;

/// Gene sets keyed by name. The map enforces unique names.
pub type GeneSets = BTreeMap<String, Vec<String>>;

/// A gene set resolved to matrix row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedGeneSet {
    pub name: String,
    /// Sorted, de-duplicated row indices.
    pub rows: Vec<usize>,
}

impl IndexedGeneSet {
    pub fn size(&self) -> usize {
        self.rows.len()
    }
}

/// Intersect every gene set with the matrix rows and keep those whose
/// resulting size lies in `[min_size, max_size]`.
///
/// Unknown identifiers are dropped silently. The output is ordered by name.
pub fn filter_gene_sets(
    matrix: &ExpressionMatrix,
    gene_sets: &GeneSets,
    min_size: usize,
    max_size: usize,
) -> Vec<IndexedGeneSet> {
    let index = matrix.gene_index();
    gene_sets
        .iter()
        .filter_map(|(name, genes)| {
            let mut rows: Vec<usize> = genes
                .iter()
                .filter_map(|g| index.get(g.as_str()).copied())
                .collect();
            rows.sort_unstable();
            rows.dedup();
            let size = rows.len();
            (size >= min_size && size <= max_size).then(|| IndexedGeneSet {
                name: name.clone(),
                rows,
            })
        })
        .collect()
}
