//! codeml control files, result parsing and likelihood-ratio tests.

use std::path::PathBuf;
use thiserror::Error;

pub mod generate;
pub mod lrt;
pub mod model;
pub mod result;
pub mod summary;

pub use generate::{
    control_files, controls_for_trees, expand_models, write_control_files, GeneratedControl,
};
pub use lrt::{evaluate_files, likelihood_ratio_test, lrt_from_values, LrtResult, Significance};
pub use model::{ControlFile, ModelDescriptor, ModelId};
pub use result::{FitResult, PositiveSite};
pub use summary::{summarize_dir, write_csv, Summary, SummaryRow, NESTED_PAIRS};

/// A result file without a usable likelihood line.
#[derive(Debug, Error)]
pub enum MalformedFitError {
    #[error("no lnL line in {}", path.display())]
    MissingLikelihood { path: PathBuf },

    #[error("cannot read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LrtError {
    #[error(transparent)]
    Malformed(MalformedFitError),

    #[error("models are not nested: np(H0) = {np_h0}, np(H1) = {np_h1}")]
    NotNested { np_h0: u32, np_h1: u32 },

    #[error("chi-squared distribution: {0}")]
    Distribution(String),
}

#[derive(Debug, Error)]
#[error("cannot write control file {}", path.display())]
pub struct ControlFileError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Glob(#[from] glob::GlobError),
}
