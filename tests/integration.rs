use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use pygeseca::correction::benjamini_hochberg;
use pygeseca::estimate::{estimate_errors, simple_log2err};
use pygeseca::matrix::ExpressionMatrix;
use pygeseca::multilevel::SplittingKernel;
use pygeseca::pathways::IndexedGeneSet;
use pygeseca::prelude::*;
use pygeseca::{GesecaError, COLUMNS};

const EPS: f64 = 1e-10;

fn random_matrix(n_genes: usize, n_samples: usize, seed: u64) -> ExpressionMatrix {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let genes = (0..n_genes).map(|i| format!("GENE_{:02}", i)).collect();
    let values = (0..n_genes * n_samples)
        .map(|_| rng.gen_range(-2.0..2.0))
        .collect();
    ExpressionMatrix::new(genes, n_samples, values).unwrap()
}

fn gene_set(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("GENE_{:02}", i)).collect()
}

/// Permutation engine returning fixed counts, keyed by gene set name.
struct FixedCounts(Vec<(&'static str, usize)>);

impl PermutationEngine for FixedCounts {
    fn count(
        &self,
        _matrix: &ExpressionMatrix,
        gene_sets: &[IndexedGeneSet],
        _n_perm: usize,
        _seed: u64,
    ) -> pygeseca::Result<Vec<PermutationCount>> {
        Ok(gene_sets
            .iter()
            .map(|s| {
                let n = self
                    .0
                    .iter()
                    .find(|(name, _)| *name == s.name)
                    .map_or(0, |(_, n)| *n);
                PermutationCount {
                    score: 1.0,
                    n_more_extreme: n,
                }
            })
            .collect())
    }
}

/// Kernel stub counting calls and answering a fixed p-value.
struct CountingKernel {
    calls: AtomicUsize,
    pval: f64,
    seeds: Mutex<Vec<u64>>,
}

impl CountingKernel {
    fn new(pval: f64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            pval,
            seeds: Mutex::new(Vec::new()),
        }
    }
}

impl SplittingKernel for CountingKernel {
    fn refine(
        &self,
        _matrix: &ExpressionMatrix,
        _observed_score_sum: f64,
        _size: usize,
        _sample_size: usize,
        seed: u64,
        _eps: f64,
    ) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seeds.lock().unwrap().push(seed);
        self.pval
    }
}

fn sets_of(sizes: &[(&str, usize)]) -> GeneSets {
    let mut start = 0;
    sizes
        .iter()
        .map(|(name, size)| {
            let genes = gene_set(start..start + size);
            start = (start + 1) % 5;
            (name.to_string(), genes)
        })
        .collect()
}

#[test]
fn scenario_twenty_genes_three_sets() {
    let matrix = random_matrix(20, 8, 42);
    let mut sets = GeneSets::new();
    sets.insert("small".into(), gene_set(0..5));
    sets.insert("medium".into(), gene_set(0..10));
    sets.insert("large".into(), gene_set(5..20));
    let config = GesecaConfig {
        n_perm_simple: 100,
        sample_size: 101,
        eps: EPS,
        seed: Some(1),
        ..GesecaConfig::default()
    };

    let out = geseca(&matrix, &sets, &config).unwrap();
    assert_eq!(out.table.columns(), &["pathway", "pctVar", "pval", "padj", "log2err", "size"]);
    assert_eq!(out.table.len(), 3);
    let sizes: Vec<(&str, usize)> = out
        .table
        .rows
        .iter()
        .map(|r| (r.pathway.as_str(), r.size))
        .collect();
    assert_eq!(sizes, vec![("large", 15), ("medium", 10), ("small", 5)]);
    for row in &out.table.rows {
        assert!(row.pval >= EPS && row.pval <= 1.0, "{:?}", row);
        assert!(row.padj >= 0.0 && row.padj <= 1.0, "{:?}", row);
        assert!(row.pct_var > 0.0 && row.pct_var <= 100.0, "{:?}", row);
    }
}

#[test]
fn even_sample_size_is_bumped_with_warning() {
    let matrix = random_matrix(20, 6, 3);
    let mut sets = GeneSets::new();
    sets.insert("a".into(), gene_set(0..4));
    let config = GesecaConfig {
        sample_size: 4,
        n_perm_simple: 50,
        seed: Some(9),
        ..GesecaConfig::default()
    };
    let kernel = CountingKernel::new(0.5);
    let engine = FixedCounts(vec![("a", 0)]);
    let out = geseca_with(&matrix, &sets, &config, &engine, &kernel).unwrap();
    assert!(out.warnings.contains(&GesecaWarning::SampleSizeAdjusted {
        requested: 4,
        used: 5
    }));
    assert_eq!(kernel.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn everything_filtered_gives_empty_table() {
    let matrix = random_matrix(20, 6, 4);
    let mut sets = GeneSets::new();
    sets.insert("tiny".into(), gene_set(0..2));
    sets.insert("unknown".into(), vec!["NOPE".into(), "NADA".into(), "NIL".into()]);
    let config = GesecaConfig {
        min_size: 3,
        max_size: Some(10),
        seed: Some(2),
        ..GesecaConfig::default()
    };
    let out = geseca(&matrix, &sets, &config).unwrap();
    assert!(out.table.is_empty());
    assert_eq!(out.table.columns(), &COLUMNS);
    assert!(out.warnings.is_empty());
}

#[test]
fn kernel_skipped_when_nothing_escalates() {
    let matrix = random_matrix(30, 6, 5);
    let sets = sets_of(&[("a", 5), ("b", 7), ("c", 9)]);
    let counts = vec![("a", 400), ("b", 650), ("c", 999)];
    let config = GesecaConfig {
        n_perm_simple: 1000,
        seed: Some(3),
        ..GesecaConfig::default()
    };
    let kernel = CountingKernel::new(1e-6);
    let out = geseca_with(&matrix, &sets, &config, &FixedCounts(counts.clone()), &kernel).unwrap();

    assert_eq!(kernel.calls.load(Ordering::SeqCst), 0);
    let expected_p: Vec<f64> = counts.iter().map(|(_, n)| (*n as f64 + 1.0) / 1001.0).collect();
    let expected_padj = benjamini_hochberg(&expected_p).unwrap();
    for (((name, n), row), padj) in counts.iter().zip(&out.table.rows).zip(&expected_padj) {
        assert_eq!(row.pathway, *name);
        assert!((row.pval - (*n as f64 + 1.0) / 1001.0).abs() < 1e-15);
        assert!((row.log2err.unwrap() - simple_log2err(*n, 1000)).abs() < 1e-15);
        assert!((row.padj - padj).abs() < 1e-15);
    }
}

#[test]
fn escalated_sets_take_kernel_pvalue_and_share_one_seed() {
    let matrix = random_matrix(30, 6, 6);
    let sets = sets_of(&[("a", 5), ("b", 5), ("c", 8), ("d", 10), ("e", 8)]);
    let counts = vec![("a", 0), ("b", 0), ("c", 0), ("d", 700), ("e", 1)];
    let config = GesecaConfig {
        n_perm_simple: 1000,
        eps: EPS,
        seed: Some(4),
        ..GesecaConfig::default()
    };
    let kernel = CountingKernel::new(1e-7);
    let out = geseca_with(&matrix, &sets, &config, &FixedCounts(counts.clone()), &kernel).unwrap();

    let mut escalated = HashSet::new();
    for (name, n) in &counts {
        let bounds = estimate_errors(*n, 1000, 101).unwrap();
        if !bounds.accepts_simple() {
            escalated.insert(*name);
        }
    }
    assert_eq!(kernel.calls.load(Ordering::SeqCst), escalated.len());
    let seeds = kernel.seeds.lock().unwrap();
    assert!(seeds.windows(2).all(|w| w[0] == w[1]));

    assert_eq!(out.table.len(), counts.len());
    for row in &out.table.rows {
        if escalated.contains(row.pathway.as_str()) {
            assert_eq!(row.pval, 1e-7);
        } else {
            assert!(row.pval > 1e-3);
        }
        assert!(row.log2err.is_some());
    }
}

#[test]
fn floor_is_reported_once() {
    let matrix = random_matrix(30, 6, 7);
    let sets = sets_of(&[("a", 5), ("b", 6), ("c", 7)]);
    let config = GesecaConfig {
        n_perm_simple: 1000,
        eps: 1e-8,
        seed: Some(5),
        ..GesecaConfig::default()
    };
    let kernel = CountingKernel::new(1e-12);
    let engine = FixedCounts(vec![("a", 0), ("b", 0), ("c", 500)]);
    let out = geseca_with(&matrix, &sets, &config, &engine, &kernel).unwrap();

    let floored: Vec<_> = out
        .warnings
        .iter()
        .filter(|w| matches!(w, GesecaWarning::PvaluesFloored { .. }))
        .collect();
    assert_eq!(
        floored,
        vec![&GesecaWarning::PvaluesFloored {
            count: 2,
            eps: 1e-8
        }]
    );
    for name in ["a", "b"] {
        let row = out.table.get(name).unwrap();
        assert_eq!(row.pval, 1e-8);
        assert!(row.log2err.is_none());
    }
    assert!(out.table.get("c").unwrap().log2err.is_some());
}

#[test]
fn adjustment_uses_all_rows() {
    let matrix = random_matrix(30, 6, 8);
    let sets = sets_of(&[("a", 5), ("b", 6), ("c", 7), ("d", 8)]);
    let engine = FixedCounts(vec![("a", 0), ("b", 30), ("c", 300), ("d", 0)]);
    let config = GesecaConfig {
        n_perm_simple: 1000,
        eps: EPS,
        seed: Some(6),
        ..GesecaConfig::default()
    };
    let kernel = CountingKernel::new(2e-5);
    let out = geseca_with(&matrix, &sets, &config, &engine, &kernel).unwrap();

    let pvals: Vec<f64> = out.table.rows.iter().map(|r| r.pval).collect();
    let expected = benjamini_hochberg(&pvals).unwrap();
    for (row, padj) in out.table.rows.iter().zip(expected) {
        assert!((row.padj - padj).abs() < 1e-15);
    }
}

#[test]
fn output_order_ignores_dispatch_order() {
    let matrix = random_matrix(40, 8, 10);
    let sets = sets_of(&[("z", 5), ("y", 6), ("x", 7), ("w", 8), ("v", 9), ("u", 10)]);
    let engine = FixedCounts(vec![("z", 0), ("y", 0), ("x", 0), ("w", 0), ("v", 0), ("u", 0)]);
    let kernel = CountingKernel::new(1e-4);

    let mut tables = Vec::new();
    for seed in 0..5 {
        let config = GesecaConfig {
            n_perm_simple: 500,
            seed: Some(seed),
            nproc: 3,
            ..GesecaConfig::default()
        };
        tables.push(geseca_with(&matrix, &sets, &config, &engine, &kernel).unwrap().table);
    }
    let names: Vec<&str> = tables[0].rows.iter().map(|r| r.pathway.as_str()).collect();
    assert_eq!(names, vec!["u", "v", "w", "x", "y", "z"]);
    for t in &tables[1..] {
        assert_eq!(t, &tables[0]);
    }
}

#[test]
fn strong_module_is_resolved_below_permutation_limit() {
    let mut rng = ChaCha20Rng::seed_from_u64(77);
    let n_genes = 100;
    let n_samples = 12;
    let signal: Vec<f64> = (0..n_samples).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let mut values = Vec::new();
    for g in 0..n_genes {
        for s in 0..n_samples {
            let noise = rng.gen_range(-1.0..1.0);
            values.push(if g < 10 { signal[s] + 0.2 * noise } else { noise });
        }
    }
    let genes = (0..n_genes).map(|i| format!("GENE_{:02}", i)).collect();
    let matrix = ExpressionMatrix::new(genes, n_samples, values).unwrap();
    let mut sets = GeneSets::new();
    sets.insert("module".into(), gene_set(0..10));
    sets.insert("background".into(), gene_set(50..60));
    let config = GesecaConfig {
        n_perm_simple: 200,
        eps: 1e-30,
        seed: Some(11),
        ..GesecaConfig::default()
    };

    let out = geseca(&matrix, &sets, &config).unwrap();
    let module = out.table.get("module").unwrap();
    assert!(module.pval < 1.0 / 201.0, "{:?}", module);
    let background = out.table.get("background").unwrap();
    assert!(background.pval > 1e-3, "{:?}", background);
}

#[test]
fn constant_row_with_scaling_is_fatal() {
    let genes = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let matrix = ExpressionMatrix::from_rows(
        genes,
        vec![vec![1.0, 2.0, 3.0], vec![4.0, 4.0, 4.0], vec![0.0, 1.0, 0.0]],
    )
    .unwrap();
    let mut sets = GeneSets::new();
    sets.insert("s".into(), vec!["A".into(), "C".into()]);
    let config = GesecaConfig {
        scale: true,
        ..GesecaConfig::default()
    };
    match geseca(&matrix, &sets, &config) {
        Err(GesecaError::ZeroVarianceRow { gene }) => assert_eq!(gene, "B"),
        other => panic!("expected zero variance error, got {:?}", other),
    }
}
