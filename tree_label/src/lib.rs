//! tree_label
//!
//! Newick trees with PAML node numbering and foreground-branch labeling:
//! every leaf matching a name pattern gets up to `depth` of its ancestors
//! marked, one labeled tree variant per newly marked ancestor.

mod label;
pub mod newick;

pub use label::{
    compile_pattern, label_by_pattern, label_nodes, suffixed_path, write_labeled_nodes,
    write_unlabeled, write_variants, LabeledVariant, DEFAULT_DEPTH, UNLABELED_SUFFIX,
};
pub use newick::{Node, NodeIdx, Tree};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("empty tree")]
    Empty,

    #[error("invalid newick at byte {pos}: {msg}")]
    Parse { pos: usize, msg: String },

    #[error("no node with id {0}")]
    UnknownNode(usize),

    #[error("invalid node name pattern")]
    Pattern(#[from] regex::Error),

    #[error("error accessing tree file \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
