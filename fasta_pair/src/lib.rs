//! fasta_pair
//!
//! Consistency checks between the nucleotide (`nuc/`) and peptide (`pep/`)
//! inputs of a run, the faulty-pair side collection, CDS rescue of faulty
//! pairs, and the alignment helpers used between the alignment and tree
//! phases.

mod error;
pub mod fix;
pub mod msa;
pub mod validate;

pub use error::{FastaIoError, MsaError, PairingError};
pub use validate::{validate_input_dir, validate_pair, LengthMismatch, UnitFiles, Validation};

use bio::io::fasta::{self, Record};
use std::fs::File;
use std::path::Path;

pub const NUC_DIR: &str = "nuc";
pub const PEP_DIR: &str = "pep";

/// Read every record of a FASTA file.
pub fn read_records(path: &Path) -> Result<Vec<Record>, FastaIoError> {
    let file = File::open(path).map_err(FastaIoError::at(path))?;
    fasta::Reader::new(file)
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(FastaIoError::at(path))
}

/// Write records to `path`, replacing it.
pub fn write_records<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<(), FastaIoError> {
    let mut writer = fasta::Writer::new(File::create(path).map_err(FastaIoError::at(path))?);
    for record in records {
        writer.write_record(record).map_err(FastaIoError::at(path))?;
    }
    writer.flush().map_err(FastaIoError::at(path))
}

/// The file name without its last extension, `OG1.nuc.fa` -> `OG1.nuc`.
pub fn base_name(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}
