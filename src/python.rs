use std::collections::HashMap;

use numpy::PyReadonlyArray2;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::GesecaConfig;
use crate::error::GesecaError;
use crate::geseca::{geseca as run_geseca, geseca_simple as run_geseca_simple, GesecaOutput};
use crate::matrix::ExpressionMatrix;
use crate::pathways::GeneSets;

impl From<GesecaError> for PyErr {
    fn from(err: GesecaError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct GesecaRow {
    #[pyo3(get)]
    pub pathway: String,
    #[pyo3(get)]
    pub pct_var: f64,
    #[pyo3(get)]
    pub pval: f64,
    #[pyo3(get)]
    pub padj: f64,
    #[pyo3(get)]
    pub log2err: Option<f64>,
    #[pyo3(get)]
    pub size: usize,
}

impl From<crate::merge::GesecaRow> for GesecaRow {
    fn from(row: crate::merge::GesecaRow) -> Self {
        Self {
            pathway: row.pathway,
            pct_var: row.pct_var,
            pval: row.pval,
            padj: row.padj,
            log2err: row.log2err,
            size: row.size,
        }
    }
}

fn to_matrix(matrix: PyReadonlyArray2<f64>, genes: Vec<String>) -> PyResult<ExpressionMatrix> {
    let view = matrix.as_array();
    let n_samples = view.shape()[1];
    if view.shape()[0] != genes.len() {
        return Err(PyValueError::new_err(format!(
            "matrix has {} rows but {} gene names were given",
            view.shape()[0],
            genes.len()
        )));
    }
    let values: Vec<f64> = view.iter().copied().collect();
    Ok(ExpressionMatrix::new(genes, n_samples, values)?)
}

fn to_python(out: GesecaOutput) -> (Vec<GesecaRow>, Vec<String>) {
    let rows = out.table.rows.into_iter().map(GesecaRow::from).collect();
    let warnings = out.warnings.iter().map(ToString::to_string).collect();
    (rows, warnings)
}

#[allow(clippy::too_many_arguments)]
fn config(
    min_size: usize,
    max_size: Option<usize>,
    center: bool,
    scale: bool,
    sample_size: usize,
    eps: f64,
    n_perm_simple: usize,
    nproc: usize,
    seed: Option<u64>,
) -> GesecaConfig {
    GesecaConfig {
        min_size,
        max_size,
        center,
        scale,
        sample_size,
        eps,
        n_perm_simple,
        nproc,
        seed,
    }
}

#[pyfunction]
#[pyo3(signature = (matrix, genes, pathways, min_size=1, max_size=None, center=true, scale=false, sample_size=101, eps=1e-50, n_perm_simple=1000, nproc=0, seed=None))]
#[allow(clippy::too_many_arguments)]
fn geseca(
    py: Python<'_>,
    matrix: PyReadonlyArray2<f64>,
    genes: Vec<String>,
    pathways: HashMap<String, Vec<String>>,
    min_size: usize,
    max_size: Option<usize>,
    center: bool,
    scale: bool,
    sample_size: usize,
    eps: f64,
    n_perm_simple: usize,
    nproc: usize,
    seed: Option<u64>,
) -> PyResult<(Vec<GesecaRow>, Vec<String>)> {
    let matrix = to_matrix(matrix, genes)?;
    let sets: GeneSets = pathways.into_iter().collect();
    let config = config(min_size, max_size, center, scale, sample_size, eps, n_perm_simple, nproc, seed);
    let out = py.allow_threads(|| run_geseca(&matrix, &sets, &config))?;
    Ok(to_python(out))
}

#[pyfunction]
#[pyo3(signature = (matrix, genes, pathways, min_size=1, max_size=None, center=true, scale=false, n_perm_simple=1000, nproc=0, seed=None))]
#[allow(clippy::too_many_arguments)]
fn geseca_simple(
    py: Python<'_>,
    matrix: PyReadonlyArray2<f64>,
    genes: Vec<String>,
    pathways: HashMap<String, Vec<String>>,
    min_size: usize,
    max_size: Option<usize>,
    center: bool,
    scale: bool,
    n_perm_simple: usize,
    nproc: usize,
    seed: Option<u64>,
) -> PyResult<(Vec<GesecaRow>, Vec<String>)> {
    let matrix = to_matrix(matrix, genes)?;
    let sets: GeneSets = pathways.into_iter().collect();
    let config = config(min_size, max_size, center, scale, 101, 0.0, n_perm_simple, nproc, seed);
    let out = py.allow_threads(|| run_geseca_simple(&matrix, &sets, &config))?;
    Ok(to_python(out))
}

#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(geseca, m)?)?;
    m.add_function(wrap_pyfunction!(geseca_simple, m)?)?;
    m.add_class::<GesecaRow>()?;
    Ok(())
}
