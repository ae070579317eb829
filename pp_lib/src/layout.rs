//! Where the artifacts of a run live.
//!
//! ```text
//! <out_dir>/
//!   phase_paml.db
//!   faulty/{nuc,pep}/
//!   <unit>/<unit>.nuc.fa, <unit>.pep.fa, <unit>.pep.msa, <unit>.paml, ...
//! ```

use pp_types::UnitId;
use std::path::{Path, PathBuf};

/// Default name of the event database inside the output directory.
pub const DATABASE_FILE: &str = "phase_paml.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        RunLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    /// Side collection of record pairs failing the length check.
    pub fn faulty_dir(&self) -> PathBuf {
        self.root.join("faulty")
    }

    pub fn unit(&self, unit: &UnitId) -> UnitPaths {
        UnitPaths {
            unit: unit.clone(),
            dir: self.root.join(unit.as_str()),
        }
    }
}

/// Artifacts of one unit. Every file sits in the unit's directory and is
/// named after the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    pub unit: UnitId,
    pub dir: PathBuf,
}

impl UnitPaths {
    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{suffix}", self.unit))
    }

    /// Staged nucleotide input.
    pub fn nuc(&self) -> PathBuf {
        self.file(".nuc.fa")
    }

    /// Staged peptide input.
    pub fn pep(&self) -> PathBuf {
        self.file(".pep.fa")
    }

    pub fn rescued_nuc(&self) -> PathBuf {
        self.file(".rescued.nuc.fa")
    }

    pub fn rescued_pep(&self) -> PathBuf {
        self.file(".rescued.pep.fa")
    }

    /// Output prefix handed to the aligner, which appends `.best.fas`.
    pub fn aligner_prefix(&self) -> PathBuf {
        self.file(".prank")
    }

    pub fn aligner_output(&self) -> PathBuf {
        self.file(".prank.best.fas")
    }

    pub fn pep_msa(&self) -> PathBuf {
        self.file(".pep.msa")
    }

    /// Nucleotide records in the order of the peptide alignment.
    pub fn nuc_ordered(&self) -> PathBuf {
        self.file(".nuc.ordered.fa")
    }

    /// Codon alignment in PAML format, gap columns removed.
    pub fn paml(&self) -> PathBuf {
        self.file(".paml")
    }

    /// Codon alignment in PAML format, with gaps.
    pub fn paml_gapped(&self) -> PathBuf {
        self.file(".pamlg")
    }

    pub fn codon_fasta(&self) -> PathBuf {
        self.file(".codon.fa")
    }

    pub fn phylip(&self) -> PathBuf {
        self.file(".phy")
    }

    pub fn raxml_best_tree(&self) -> PathBuf {
        self.dir.join(format!("RAxML_bestTree.{}", self.unit))
    }

    pub fn tree(&self) -> PathBuf {
        self.file(".nwk")
    }
}
