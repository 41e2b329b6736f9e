use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use pygeseca::io::{read_gmt_path, read_matrix_path, write_table};
use pygeseca::{geseca, geseca_simple, GesecaConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Gene set co-regulation analysis.", long_about = None)]
struct CliArgs {
    /// Expression matrix, tab-separated, genes in rows.
    #[arg(short, long)]
    matrix: PathBuf,

    /// Gene sets in GMT format.
    #[arg(short, long)]
    gene_sets: PathBuf,

    /// Output file; stdout when absent.
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(long, default_value_t = 1)]
    min_size: usize,

    #[arg(long)]
    max_size: Option<usize>,

    /// Do not center rows.
    #[arg(long)]
    no_center: bool,

    /// Scale rows to unit variance.
    #[arg(long)]
    scale: bool,

    #[arg(long, default_value_t = 101)]
    sample_size: usize,

    #[arg(long, default_value_t = 1e-50)]
    eps: f64,

    #[arg(long, default_value_t = 1000)]
    n_perm_simple: usize,

    /// Worker threads; 0 uses all cores.
    #[arg(short = 't', long, default_value_t = 0)]
    nproc: usize,

    #[arg(long)]
    seed: Option<u64>,

    /// Permutation estimate only, no multilevel refinement.
    #[arg(long)]
    simple: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let level = args
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or_else(|_| {
            eprintln!(
                "Warning: invalid log level '{}', defaulting to info.",
                args.log_level
            );
            log::LevelFilter::Info
        });
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    let start = Instant::now();
    let matrix = read_matrix_path(&args.matrix)
        .with_context(|| format!("reading matrix {}", args.matrix.display()))?;
    let sets = read_gmt_path(&args.gene_sets)
        .with_context(|| format!("reading gene sets {}", args.gene_sets.display()))?;
    info!(
        "loaded {} genes x {} samples, {} gene sets",
        matrix.n_genes(),
        matrix.n_samples(),
        sets.len()
    );

    let config = GesecaConfig {
        min_size: args.min_size,
        max_size: args.max_size,
        center: !args.no_center,
        scale: args.scale,
        sample_size: args.sample_size,
        eps: args.eps,
        n_perm_simple: args.n_perm_simple,
        nproc: args.nproc,
        seed: args.seed,
    };

    let out = if args.simple {
        geseca_simple(&matrix, &sets, &config)?
    } else {
        geseca(&matrix, &sets, &config)?
    };

    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_table(&out.table, BufWriter::new(file))?;
        }
        None => write_table(&out.table, io::stdout().lock())?,
    }

    info!(
        "{} gene sets tested in {:.2?}",
        out.table.len(),
        start.elapsed()
    );
    Ok(())
}
