use itertools::Itertools;
use pp_types::UnitId;
use std::path::PathBuf;
use thiserror::Error;

/// A FASTA file could not be read or written.
#[derive(Debug, Error)]
#[error("error accessing fasta file \"{}\"", path.display())]
pub struct FastaIoError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl FastaIoError {
    pub(crate) fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> FastaIoError {
        let path = path.into();
        move |source| FastaIoError { path, source }
    }
}

/// The nucleotide and peptide inputs cannot be paired. Always fatal for a run.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("input directory \"{}\" has no '{sub}' subdirectory", dir.display())]
    MissingDir { dir: PathBuf, sub: &'static str },

    #[error(
        "fasta files in the nuc/ and pep/ directories do not match \
         (only in nuc/: [{}], only in pep/: [{}])",
        only_nuc.iter().join(", "),
        only_pep.iter().join(", ")
    )]
    UnmatchedFiles {
        only_nuc: Vec<String>,
        only_pep: Vec<String>,
    },

    #[error("two files in \"{}\" share the base name '{base}'", dir.display())]
    DuplicateBaseName { dir: PathBuf, base: String },

    #[error(
        "record names of {unit} differ between the nucleotide and peptide files \
         (nuc: [{}], pep: [{}])",
        nuc.iter().join(", "),
        pep.iter().join(", ")
    )]
    RecordNames {
        unit: UnitId,
        nuc: Vec<String>,
        pep: Vec<String>,
    },

    #[error(transparent)]
    Io(#[from] FastaIoError),
}

/// Problems with an alignment file.
#[derive(Debug, Error)]
pub enum MsaError {
    #[error("alignment lengths differ in \"{}\" at {record} ({len} vs {expected})", path.display())]
    RaggedAlignment {
        path: PathBuf,
        record: String,
        len: usize,
        expected: usize,
    },

    #[error("record {record} of \"{}\" is missing from \"{}\"", msa.display(), source_fa.display())]
    MissingRecord {
        record: String,
        msa: PathBuf,
        source_fa: PathBuf,
    },

    #[error("\"{}\" is not a PAML alignment: {reason}", path.display())]
    BadPaml { path: PathBuf, reason: String },

    #[error("\"{}\" contains no sequences", path.display())]
    Empty { path: PathBuf },

    #[error(transparent)]
    Io(#[from] FastaIoError),
}
