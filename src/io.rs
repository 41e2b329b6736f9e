//! Tab-separated matrix and GMT input, TSV result output.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{GesecaError, Result};
use crate::matrix::ExpressionMatrix;
use crate::merge::{GesecaTable, COLUMNS};
use crate::pathways::GeneSets;

/// Read an expression matrix: a header line (first cell ignored, then sample
/// names) followed by one line per gene, identifier first.
pub fn read_matrix<R: Read>(reader: R) -> Result<ExpressionMatrix> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_reader(reader);
    let n_samples = rdr.headers()?.len().saturating_sub(1);

    let mut genes = Vec::new();
    let mut values = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        let gene = fields
            .next()
            .ok_or_else(|| GesecaError::Parse(format!("empty matrix line {}", line + 2)))?;
        genes.push(gene.to_string());
        for field in fields {
            let v: f64 = field.trim().parse().map_err(|_| {
                GesecaError::Parse(format!(
                    "line {}: '{}' is not a number (gene '{}')",
                    line + 2,
                    field,
                    gene
                ))
            })?;
            values.push(v);
        }
    }
    ExpressionMatrix::new(genes, n_samples, values)
}

pub fn read_matrix_path<P: AsRef<Path>>(path: P) -> Result<ExpressionMatrix> {
    read_matrix(File::open(path)?)
}

/// Read gene sets in GMT format: name, description, then gene identifiers.
pub fn read_gmt<R: Read>(reader: R) -> Result<GeneSets> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut sets = GeneSets::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let Some(name) = record.get(0).filter(|n| !n.is_empty()) else {
            continue;
        };
        let genes: Vec<String> = record
            .iter()
            .skip(2)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        if sets.insert(name.to_string(), genes).is_some() {
            return Err(GesecaError::Parse(format!(
                "line {}: duplicate gene set name '{}'",
                line + 1,
                name
            )));
        }
    }
    Ok(sets)
}

pub fn read_gmt_path<P: AsRef<Path>>(path: P) -> Result<GeneSets> {
    read_gmt(File::open(path)?)
}

/// Write the result table as TSV; an undefined `log2err` is written as `NA`.
pub fn write_table<W: Write>(table: &GesecaTable, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    wtr.write_record(COLUMNS)?;
    for row in &table.rows {
        let log2err = row
            .log2err
            .map_or_else(|| "NA".to_string(), |e| e.to_string());
        wtr.write_record([
            row.pathway.clone(),
            row.pct_var.to_string(),
            row.pval.to_string(),
            row.padj.to_string(),
            log2err,
            row.size.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
