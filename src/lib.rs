//! Gene set co-regulation analysis with adaptive p-value resolution.
//!
//! Each gene set is scored by the share of total expression variance carried
//! by its summed profile. A cheap permutation estimate is computed for every
//! set; sets whose estimate is not precise enough are re-estimated with a
//! multilevel splitting sampler, grouped by set size. Both branches are merged
//! into one Benjamini–Hochberg adjusted table ordered by gene set name.
//!
//! ```no_run
//! use pygeseca::prelude::*;
//!
//! let matrix = read_matrix_path("expr.tsv")?;
//! let sets = read_gmt_path("sets.gmt")?;
//! let out = geseca(&matrix, &sets, &GesecaConfig::default())?;
//! for row in &out.table.rows {
//!     println!("{} {:.2} {:e}", row.pathway, row.pct_var, row.pval);
//! }
//! # Ok::<(), pygeseca::GesecaError>(())
//! ```

pub mod config;
pub mod correction;
pub mod error;
pub mod estimate;
pub mod geseca;
pub mod io;
pub mod matrix;
pub mod merge;
pub mod multilevel;
pub mod pathways;
pub mod router;
pub mod score;
pub mod simple;

#[cfg(feature = "python")]
mod python;

pub use config::{GesecaConfig, GesecaWarning};
pub use error::{GesecaError, Result};
pub use geseca::{geseca, geseca_simple, geseca_with, GesecaOutput};
pub use matrix::ExpressionMatrix;
pub use merge::{GesecaRow, GesecaTable, COLUMNS};
pub use pathways::GeneSets;

pub mod prelude {
    pub use crate::config::{GesecaConfig, GesecaWarning};
    pub use crate::geseca::{geseca, geseca_simple, geseca_with, GesecaOutput};
    pub use crate::io::{read_gmt_path, read_matrix_path, write_table};
    pub use crate::matrix::ExpressionMatrix;
    pub use crate::merge::{GesecaRow, GesecaTable};
    pub use crate::multilevel::{MultilevelSplitting, SplittingKernel};
    pub use crate::pathways::GeneSets;
    pub use crate::simple::{PermutationCount, PermutationEngine, SimplePermutation};
}
